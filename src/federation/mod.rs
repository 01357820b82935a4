//! ActivityPub federation module
//!
//! Handles:
//! - RSA keypairs
//! - HTTP Signatures (signing and verification)
//! - Outbound HTTP transport
//! - IRI dereferencing and public key lookup

mod dereference;
mod keypair;
mod signature;
mod transport;

pub use dereference::{Dereferencer, LD_JSON};
pub use keypair::{KEY_BITS, Keypair};
pub use signature::{
    ALGORITHM, DEFAULT_HEADERS, REPLAY_THRESHOLD_SECONDS, SignatureParams, SignatureService,
    digest_header, key_id_matches_actor, signing_string,
};
pub use transport::{HttpTransport, ReqwestTransport};
