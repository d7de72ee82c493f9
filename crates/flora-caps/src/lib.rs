//! Caps: the ordered, self-describing binary container carried by every
//! flora message.
//!
//! A Caps is a tape of typed entries (`i32`, `f32`, `i64`, `f64`, UTF-8
//! strings, binaries and nested Caps). Writers append; readers consume in
//! the same order, and must ask for the type that was written:
//!
//! ```
//! use flora_caps::{Caps, CapsError, ValueType};
//!
//! let mut caps = Caps::new();
//! caps.write_str("volume")?;
//! caps.write_i32(30)?;
//! let wire = caps.serialize()?;
//!
//! let mut received = Caps::parse(&wire)?;
//! assert_eq!(received.peek_type()?, ValueType::String);
//! assert!(matches!(received.read_i32(), Err(CapsError::IncorrectType { .. })));
//! assert_eq!(received.read_string()?, "volume");
//! assert_eq!(received.read_i32()?, 30);
//! # Ok::<(), CapsError>(())
//! ```

pub mod caps;
pub mod error;
pub mod value;
pub mod wire;

pub use caps::Caps;
pub use error::{CapsError, Result, SUCCESS};
pub use value::ValueType;
pub use wire::MAX_DEPTH;
