//! The narrow capability set every service backend presents (§4.7, §9
//! Polymorphism): `{Start(ctx,name), Stop(name), IsRunning(name)}`. Two
//! variants, no shared base behavior.

pub mod container;
pub mod native;

use async_trait::async_trait;

use crate::error::ServiceError;
use hopbox_proto::ServiceDef;

#[async_trait]
pub trait ServiceBackend: Send + Sync {
    async fn start(&self, def: &ServiceDef) -> Result<(), ServiceError>;
    async fn stop(&self, name: &str) -> Result<(), ServiceError>;
    async fn is_running(&self, name: &str) -> bool;
}

pub use container::ContainerBackend;
pub use native::NativeBackend;
