//! Tick-space coordinate types for the collector's liveness clock.
//!
//! The collector ages table rows on a discrete tick lattice: one tick per
//! report interval, advanced by the periodic timer rather than derived from
//! wall-clock reads. The types here represent points and spans in that tick
//! space, keeping dimensional roles explicit even though the underlying
//! representation is a `u64` count.

use core::ops::Add;

/// A point on the discrete tick lattice.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TickInstant(u64);

impl TickInstant {
    /// Process start.
    pub const ZERO: Self = Self(0);

    /// Creates a new tick instant from a raw tick count.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying tick count.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Adds a tick span to this instant.
    #[inline]
    #[must_use]
    pub const fn add_span(self, span: TickSpan) -> Self {
        Self(self.0 + span.0)
    }

    /// Returns the span elapsed since `earlier`, saturating at zero.
    #[inline]
    #[must_use]
    pub const fn since(self, earlier: TickInstant) -> TickSpan {
        TickSpan(self.0.saturating_sub(earlier.0))
    }
}

/// A span in tick space (number of ticks).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct TickSpan(u64);

impl TickSpan {
    /// One tick.
    pub const ONE: Self = Self(1);

    /// Creates a new tick span from a raw tick count.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying tick count.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl Add<TickSpan> for TickInstant {
    type Output = Self;

    #[inline]
    fn add(self, rhs: TickSpan) -> Self::Output {
        self.add_span(rhs)
    }
}
