//! MAC generation from a per-task seed.

use mac_address::MacAddress;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use uuid::Uuid;

/// Generates MACs sharing a task-derived prefix.
///
/// The top three octets come from the task id (bytes 0, 4 and 6 of the
/// UUID); the rest are random. The multicast bit of the first octet is
/// always cleared.
#[derive(Debug, Clone)]
pub struct MacGenerator {
    base: [u8; 3],
    fixed_fourth: Option<u8>,
    rng: StdRng,
}

impl MacGenerator {
    /// Seed from a task id.
    pub fn from_task_id(task_id: &Uuid) -> Self {
        let b = task_id.as_bytes();
        Self::with_base([b[0], b[4], b[6], 0])
    }

    /// Use an explicit base. A nonzero fourth octet is kept fixed too.
    pub fn with_base(base: [u8; 4]) -> Self {
        Self {
            base: [base[0] & 0xfe, base[1], base[2]],
            fixed_fourth: (base[3] != 0).then_some(base[3]),
            rng: StdRng::from_entropy(),
        }
    }

    /// Make the random octets reproducible.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// The fixed prefix.
    pub fn base(&self) -> [u8; 3] {
        self.base
    }

    /// Next MAC.
    pub fn generate(&mut self) -> MacAddress {
        let fourth = self.fixed_fourth.unwrap_or_else(|| self.rng.gen());
        MacAddress::new([
            self.base[0],
            self.base[1],
            self.base[2],
            fourth,
            self.rng.gen(),
            self.rng.gen(),
        ])
    }
}

/// Lowercase colon-separated rendering, as the control plane stores it.
pub fn mac_string(mac: &MacAddress) -> String {
    mac.to_string().to_lowercase()
}
