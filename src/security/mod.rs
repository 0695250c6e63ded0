//! Plugin Security
//!
//! Capability flags, the permission mediator, denial stand-ins and the
//! security audit log.

pub mod audit;
pub mod capability;
pub mod denied;
pub mod mediator;

pub use audit::{AuditLog, SecurityViolation, SECURITY_TARGET};
pub use capability::{Capability, CapabilityFlags};
pub use denied::{DenialReason, DeniedCapability};
pub use mediator::{CapabilityBindings, PermissionMediator};
