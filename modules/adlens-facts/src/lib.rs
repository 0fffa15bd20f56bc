pub mod derive;
pub mod fingerprint;

pub use derive::{derive_ad_facts, AdFacts};
pub use fingerprint::{
    copy_fingerprint, creative_fingerprint, media_fingerprint, FINGERPRINT_ALGO,
};
