//! Property-set decoding layered on compound file streams.
//!
//! Property sets ([MS-OLEPS]) serialize `(id, type, value)` tuples in
//! sections named by FMTID. The decoder is pull-style: it pushes raw tagged
//! values at a [`PropertyVisitor`] and leaves interpretation to the caller.
//! [`PropertyValue`] decodes the common tag subset; the metadata layer turns
//! the two standard streams into a [`DocumentMetadata`].

/// Constants: type tags, property ids, FMTIDs
pub mod consts;

/// Visitor-driven stream decoding
mod decoder;

/// Document metadata convenience layer
mod metadata;

/// Typed property values
mod value;

// Re-export public types for convenient access
pub use decoder::{PropertySetInfo, PropertyVisitor, Visit, decode_property_set, decode_slice};
pub use metadata::DocumentMetadata;
pub use value::PropertyValue;
