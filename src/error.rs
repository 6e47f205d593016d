//! Error types for outline geometry and domain bookkeeping.

use thiserror::Error;

use crate::engine::ParticleId;

/// Domain identifiers are the positive labels of a mask.
pub type DomainId = u32;

/// Failures of the mask → outline → correspondence pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// A zero-length point sequence reached a stage that needs points.
    #[error("{stage}: empty outline")]
    EmptyOutline { stage: &'static str },
    /// An outline needs at least three points to close.
    #[error("outline has {count} points, at least 3 are required")]
    TooFewPoints { count: usize },
    /// No closed nearest-neighbour cycle visits every point; the outline is
    /// degenerate, self-touching or disconnected.
    #[error("could not determine winding order of {points} outline points")]
    WindingOrder { points: usize },
    /// The mask holds no pixel with this id.
    #[error("domain {id} has no pixels in the mask")]
    DomainVanished { id: DomainId },
}

/// Failures of registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown domain {0}")]
    UnknownDomain(DomainId),
    #[error("domain {0} already exists")]
    DomainExists(DomainId),
    /// The engine no longer knows a particle the registry still references.
    #[error("domain {domain} references stale particle {particle:?}")]
    StaleParticle { domain: DomainId, particle: ParticleId },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
