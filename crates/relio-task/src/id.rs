use rand::distr::Alphanumeric;
use rand::Rng;

/// Generates the stable [`crate::Descriptor::id`] and the per-attempt
/// `running_id`.
///
/// Left pluggable so callers with their own ID scheme (ULIDs, snowflake
/// IDs, ...) can supply one instead of the default generator.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Default [`IdGenerator`]: a 15-character alphanumeric string, matching
/// the reference implementation's `taskIDSize`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

const ID_SIZE: usize = 15;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SIZE)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_ids_of_expected_length() {
        let id = RandomIdGenerator.generate();
        assert_eq!(id.len(), ID_SIZE);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generates_distinct_ids() {
        let a = RandomIdGenerator.generate();
        let b = RandomIdGenerator.generate();
        assert_ne!(a, b);
    }
}
