// ABOUTME: The two fixed pool identities of a blue-green router.
// ABOUTME: Colors never change; the active/inactive role alternates.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolColor {
    Blue,
    Green,
}

impl PoolColor {
    pub const ALL: [PoolColor; 2] = [PoolColor::Blue, PoolColor::Green];

    /// The other pool of the pair.
    pub fn other(self) -> Self {
        match self {
            PoolColor::Blue => PoolColor::Green,
            PoolColor::Green => PoolColor::Blue,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoolColor::Blue => "blue",
            PoolColor::Green => "green",
        }
    }
}

impl fmt::Display for PoolColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
