//! # codec
//!
//! why: turn term, vote and log into the single blob the store persists
//! relations: used by the Storage trait's save_state/load_state
//! what: encode_state, decode_state over serde_json

use quorum_core::HardState;

use crate::StorageError;

pub fn encode_state(state: &HardState) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(state).map_err(StorageError::Encode)
}

pub fn decode_state(blob: &[u8]) -> Result<HardState, StorageError> {
    serde_json::from_slice(blob).map_err(StorageError::Corrupt)
}
