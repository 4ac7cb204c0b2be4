//! Random resource names.

use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use uuid::Uuid;

const PART_LEN: usize = 6;

/// Generates `<prefix>_<task>_<random>` names, e.g. `lswitch_c52f4c_xFG42O`.
///
/// The task part is shared by every name of one task so that leftovers can
/// be matched by prefix. A generator never hands out the same name twice.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    task_part: String,
    rng: StdRng,
    issued: HashSet<String>,
}

impl NameGenerator {
    /// Derive the task part from `task_id`.
    pub fn new(task_id: &Uuid) -> Self {
        let simple = task_id.simple().to_string();
        Self {
            task_part: simple[..PART_LEN].to_string(),
            rng: StdRng::from_entropy(),
            issued: HashSet::new(),
        }
    }

    /// Make the random part reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Task part shared by every generated name.
    pub fn task_part(&self) -> &str {
        &self.task_part
    }

    /// Next name with `prefix`.
    pub fn generate(&mut self, prefix: &str) -> String {
        loop {
            let random: String = (&mut self.rng)
                .sample_iter(&Alphanumeric)
                .take(PART_LEN)
                .map(char::from)
                .collect();
            let name = format!("{prefix}_{}_{random}", self.task_part);
            if self.issued.insert(name.clone()) {
                return name;
            }
        }
    }
}
