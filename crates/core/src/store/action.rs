//! Actions the store reduces.

use super::state::HashState;
use serde::{Deserialize, Serialize};

/// A dispatched action, tagged by `type` on the wire.
///
/// ```json
/// {"type": "PICK_CONDITION", "selection": "44054006"}
/// {"type": "NEW_HASH_STATE", "hash": {"reason": "44054006"}}
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// The user picked a condition. Always produces a change notification.
    PickCondition {
        #[serde(default)]
        selection: Option<String>,
    },
    /// The page's location hash changed. Only a hash carrying `reason` changes the selection.
    NewHashState {
        #[serde(default)]
        hash: HashState,
    },
}

impl Action {
    pub fn pick_condition(code: impl Into<String>) -> Self {
        Self::PickCondition {
            selection: Some(code.into()),
        }
    }

    pub fn new_hash_state(reason: Option<&str>) -> Self {
        Self::NewHashState {
            hash: HashState {
                reason: reason.map(str::to_string),
            },
        }
    }
}
