use crate::db::DatabaseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Lifecycle of the AI-derived fields on a case:
// empty -> pending -> current | stale, and current/stale -> pending on the next edit.
str_enum!(DerivedStatus {
    Empty => "empty",
    Pending => "pending",
    Current => "current",
    Stale => "stale",
});

str_enum!(ReportKind {
    OutpatientDischarge => "alta_ambulatoria",
    Hospitalization => "hospitalizacion",
    Referral => "interconsulta",
});

impl ReportKind {
    pub fn all() -> &'static [ReportKind] {
        &[
            ReportKind::OutpatientDischarge,
            ReportKind::Hospitalization,
            ReportKind::Referral,
        ]
    }

    /// Human-readable Spanish title, used in prompts and user notices.
    pub fn title(&self) -> &'static str {
        match self {
            ReportKind::OutpatientDischarge => "Alta ambulatoria",
            ReportKind::Hospitalization => "Hospitalización",
            ReportKind::Referral => "Interconsulta",
        }
    }
}
