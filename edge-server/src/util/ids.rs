//! Record id generation.

use chrono::Utc;
use rand::distributions::Uniform;
use rand::prelude::*;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Generate an id of the form `{prefix}_{epoch_millis}_{random base-36}`.
pub fn generate_id(prefix: &str) -> String {
    let mut rng = thread_rng();
    let dist = Uniform::from(0..ID_ALPHABET.len());
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[dist.sample(&mut rng)] as char)
        .collect();

    format!("{}_{}_{}", prefix, Utc::now().timestamp_millis(), suffix)
}
