//! Datastore-wide ready flag

use crate::errors::KeyError;
use crate::key::{Key, ValueShape};
use crate::KEY_ROOT;
use std::fmt;

/// Key for the global ready flag, `/nimbess/ready`
///
/// Holds a raw boolean telling datastore readers whether the writer has
/// finished its initial synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReadyFlagKey;

impl Key for ReadyFlagKey {
    fn default_path(&self) -> Result<String, KeyError> {
        Ok(format!("{KEY_ROOT}/ready"))
    }

    fn value_shape(&self) -> Result<ValueShape, KeyError> {
        Ok(ValueShape::RawBool)
    }
}

impl fmt::Display for ReadyFlagKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ReadyFlag")
    }
}
