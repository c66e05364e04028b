//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values, e.g.
/// `Money::from_cents(5000) == Money::from_cents(5000)`. To "modify" one,
/// build a new value. Entities (`Product`, `Order`, ...) are the opposite:
/// they are compared by identity.
pub trait ValueObject: Copy + PartialEq + core::fmt::Debug {}
