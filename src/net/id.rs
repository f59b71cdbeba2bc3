//! Index handles into the simulator's topology arena.
//!
//! Nodes, devices, channels and applications live in `Vec`s owned by the
//! `Simulator`. Everything else refers to them by these copyable
//! newtypes, so there are no reference cycles between a node, its
//! devices and the channel joining them.

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub fn new(raw: u32) -> Self {
                $name(raw)
            }

            #[inline]
            pub fn raw(self) -> u32 {
                self.0
            }

            /// Position in the owning arena.
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }

            pub(crate) fn from_index(index: usize) -> Self {
                $name(u32::try_from(index).expect("arena exceeds u32::MAX entries"))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// A simulated host.
    NodeId,
    "N"
);
arena_id!(
    /// A network interface owned by exactly one node.
    DeviceId,
    "D"
);
arena_id!(
    /// A transmission medium joining devices.
    ChannelId,
    "C"
);
arena_id!(
    /// An installed application.
    AppId,
    "A"
);
