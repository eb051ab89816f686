//! Provider resource models and their state tables
//!
//! Each provider reports state as an upper-case (or Pascal-case) string. The
//! enums here keep any value they do not recognise verbatim, so a new state
//! rolled out by the provider reaches the classifier and is rejected as
//! unknown instead of failing deserialization.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use opwatch_poll::{Bucket, StateClassifier};

/// Declares a provider state enum that round-trips through its wire string.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A value this crate does not know, kept verbatim.
            Unrecognized(String),
        }

        impl $name {
            /// Every known state.
            pub const KNOWN: &'static [Self] = &[$(Self::$variant),+];

            /// Wire representation.
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $wire, )+
                    Self::Unrecognized(raw) => raw,
                }
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                match raw {
                    $( $wire => Self::$variant, )+
                    other => Self::Unrecognized(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self::from(raw.as_str())
            }
        }

        impl From<$name> for String {
            fn from(state: $name) -> Self {
                match state {
                    $name::Unrecognized(raw) => raw,
                    known => known.as_str().to_string(),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use wire_enum;

pub mod argo;
pub mod infra;
pub mod vertex;

/// Build a classifier from three disjoint state lists.
pub(crate) fn table<S>(
    resource: &str,
    in_progress: &[S],
    succeeded: &[S],
    failed: &[S],
) -> StateClassifier<S>
where
    S: Clone + Eq + Hash + fmt::Display,
{
    let buckets = [
        (in_progress, Bucket::InProgress),
        (succeeded, Bucket::Succeeded),
        (failed, Bucket::Failed),
    ];
    let map: HashMap<S, Bucket> = buckets
        .into_iter()
        .flat_map(|(states, bucket)| states.iter().cloned().map(move |s| (s, bucket)))
        .collect();
    StateClassifier::from_map(resource, map)
}

/// Re-key a typed classifier by the wire strings of its states.
pub fn by_wire_name<S>(classifier: &StateClassifier<S>) -> StateClassifier<String>
where
    S: Eq + Hash + fmt::Display,
{
    StateClassifier::from_map(
        classifier.resource(),
        classifier
            .entries()
            .map(|(state, bucket)| (state.to_string(), bucket))
            .collect(),
    )
}
