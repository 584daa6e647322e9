// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Deployment/replica IDs, group names, pool colors, and image references.

mod group_name;
mod id;
mod image_ref;
mod pool_color;

pub use group_name::{GroupName, GroupNameError};
pub use id::{DeploymentId, ReplicaId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use pool_color::PoolColor;
