//! Bridge configuration trait.

use crate::{radio::RadioDriver, time::Sleeper, time::Timer};

// TODO: Use associated type defaults in the trait once stable

/// Trait for PHY bridge configurations.
///
/// This trait defines the hardware-specific types used throughout the bridge: the time source
/// and the radio driver. The indication queue's consumer half is supplied separately to
/// [`crate::dispatcher::Dispatcher`] as its own type parameter, since [`crate::queue::Consumer`]
/// implementations are typically borrowed (split from a `'static` queue), and associated types
/// can't carry a lifetime without generic associated types.
///
/// Every firmware image must define a type implementing this trait and supply it to
/// [`crate::dispatcher::Dispatcher`].
pub trait Config {
    /// A time source with microsecond resolution, also used to pace the turnaround-offset sleep.
    type Timer: Timer + Sleeper;

    /// The radio driver backing the PHY SAP.
    type Radio: RadioDriver;
}
