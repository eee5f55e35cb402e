use rand::Rng;
use tracing::debug;

use crate::distribution::JointDistribution;
use crate::error::{ChaosError, Result};
use crate::sample::Sample;

/// How design points are drawn from the input distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExperimentKind {
    /// Independent draws.
    #[default]
    MonteCarlo,
    /// One draw per equiprobable stratum of every marginal, strata paired
    /// at random across inputs.
    LatinHypercube,
}

/// Design-of-experiments generator over a joint input distribution.
#[derive(Debug, Clone)]
pub struct Experiment<'a> {
    distribution: &'a JointDistribution,
    kind: ExperimentKind,
}

impl<'a> Experiment<'a> {
    pub fn new(distribution: &'a JointDistribution, kind: ExperimentKind) -> Self {
        Self { distribution, kind }
    }

    pub fn kind(&self) -> ExperimentKind {
        self.kind
    }

    /// Draw `size` design points.
    pub fn generate<R: Rng + ?Sized>(&self, size: usize, rng: &mut R) -> Result<Sample> {
        if size == 0 {
            return Err(ChaosError::InvalidArgument {
                stage: "experiment",
                reason: "sample size must be at least 1".to_string(),
            });
        }
        debug!(size, kind = ?self.kind, "drawing design points");
        match self.kind {
            ExperimentKind::MonteCarlo => self.distribution.sample(size, rng),
            ExperimentKind::LatinHypercube => self.distribution.latin_hypercube(size, rng),
        }
    }

    /// Two independent designs: the training set first, then the validation set.
    ///
    /// Both come from consecutive draws of `rng`, so they never share points.
    pub fn training_and_validation<R: Rng + ?Sized>(
        &self,
        training_size: usize,
        validation_size: usize,
        rng: &mut R,
    ) -> Result<(Sample, Sample)> {
        let training = self.generate(training_size, rng)?;
        let validation = self.generate(validation_size, rng)?;
        Ok((training, validation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Marginal;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn joint() -> JointDistribution {
        JointDistribution::new(vec![
            Marginal::uniform("a", 0., 1.).unwrap(),
            Marginal::exponential("b", 2., 1.).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn zero_size_is_rejected() {
        let joint = joint();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let experiment = Experiment::new(&joint, ExperimentKind::MonteCarlo);
        assert!(matches!(
            experiment.generate(0, &mut rng),
            Err(ChaosError::InvalidArgument { .. })
        ));
        assert!(experiment.training_and_validation(5, 0, &mut rng).is_err());
    }

    #[test]
    fn training_and_validation_are_disjoint() {
        let joint = joint();
        for kind in [ExperimentKind::MonteCarlo, ExperimentKind::LatinHypercube] {
            let mut rng = ChaCha8Rng::seed_from_u64(42);
            let experiment = Experiment::new(&joint, kind);
            let (train, valid) = experiment.training_and_validation(50, 30, &mut rng).unwrap();
            assert_eq!(train.len(), 50);
            assert_eq!(valid.len(), 30);
            assert_eq!(train.names(), valid.names());
            assert!(train.rows().all(|x| valid.rows().all(|y| x != y)));
        }
    }

    #[test]
    fn seeded_designs_are_reproducible() {
        let joint = joint();
        let experiment = Experiment::new(&joint, ExperimentKind::LatinHypercube);
        let first = experiment
            .generate(20, &mut ChaCha8Rng::seed_from_u64(7))
            .unwrap();
        let second = experiment
            .generate(20, &mut ChaCha8Rng::seed_from_u64(7))
            .unwrap();
        assert_eq!(first, second);
    }
}
