//! Vendor integer enumerations with an unknown fallback

use std::borrow::Cow;
use tracing::debug;

use super::Value;

/// Integer-coded vendor enumeration.
///
/// Unrecognised codes map to the `Unknown` variant instead of failing, since
/// firmware revisions add codes without notice. Declare implementors with
/// [`int_field_enum!`](crate::int_field_enum).
pub trait IntFieldEnum: Copy + PartialEq + Sized + 'static {
    /// Every known variant, excluding `Unknown`.
    const VARIANTS: &'static [Self];
    /// Name used in log messages.
    const TYPE_NAME: &'static str;

    fn unknown() -> Self;
    fn raw(&self) -> i64;
    fn state_name(&self) -> &'static str;

    fn try_from_raw(raw: i64) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|variant| variant.raw() == raw)
    }

    fn from_raw(raw: i64) -> Self {
        Self::try_from_raw(raw).unwrap_or_else(|| {
            debug!(value = raw, enum_type = Self::TYPE_NAME, "Encountered invalid enum value");
            Self::unknown()
        })
    }

    /// Read an enum back from a stored property or raw field value.
    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64().map(Self::from_raw)
    }

    /// State names usable as select options.
    fn options(include_unknown: bool) -> Vec<&'static str> {
        let mut options: Vec<_> = Self::VARIANTS.iter().map(|v| v.state_name()).collect();
        if include_unknown {
            options.push(Self::unknown().state_name());
        }
        options
    }

    fn to_value(&self) -> Value {
        Value::Enum { raw: self.raw(), name: Cow::Borrowed(self.state_name()) }
    }

    /// Single command byte for this variant.
    fn to_byte(&self) -> u8 {
        self.raw() as u8
    }
}

/// Declare an [`IntFieldEnum`](crate::types::IntFieldEnum) with an implicit
/// `Unknown` variant.
///
/// ```rust
/// use ef_ble_protocol::int_field_enum;
/// use ef_ble_protocol::types::IntFieldEnum;
///
/// int_field_enum! {
///     pub enum FanGear {
///         Low = 0 => "low",
///         Medium = 1 => "medium",
///         High = 2 => "high",
///     }
/// }
///
/// assert_eq!(FanGear::from_raw(2), FanGear::High);
/// assert_eq!(FanGear::from_raw(9), FanGear::Unknown);
/// assert_eq!(FanGear::options(false), vec!["low", "medium", "high"]);
/// ```
#[macro_export]
macro_rules! int_field_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident = $raw:expr => $state:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant,)+
            Unknown,
        }

        impl $crate::types::IntFieldEnum for $name {
            const VARIANTS: &'static [Self] = &[$($name::$variant),+];
            const TYPE_NAME: &'static str = stringify!($name);

            fn unknown() -> Self {
                $name::Unknown
            }

            fn raw(&self) -> i64 {
                match self {
                    $($name::$variant => $raw,)+
                    $name::Unknown => -1,
                }
            }

            fn state_name(&self) -> &'static str {
                match self {
                    $($name::$variant => $state,)+
                    $name::Unknown => "unknown",
                }
            }
        }
    };
}
