// Copyright 2026 tensor-gc Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Identifiers of cached tensors and installed models.

use std::{borrow::Borrow, fmt::Display};

macro_rules! define_id {
    ($( $( #[$meta:meta] )* $name:ident, )*) => {
        $(
            $( #[$meta] )*
            #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(String);

            impl $name {
                /// Create an identifier from any string-like value.
                pub fn new(id: impl Into<String>) -> Self {
                    Self(id.into())
                }

                /// View the identifier as a string slice.
                pub fn as_str(&self) -> &str {
                    &self.0
                }
            }

            impl Display for $name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    f.write_str(&self.0)
                }
            }

            impl From<&str> for $name {
                fn from(id: &str) -> Self {
                    Self(id.to_string())
                }
            }

            impl From<String> for $name {
                fn from(id: String) -> Self {
                    Self(id)
                }
            }

            impl Borrow<str> for $name {
                fn borrow(&self) -> &str {
                    &self.0
                }
            }

            impl AsRef<str> for $name {
                fn as_ref(&self) -> &str {
                    &self.0
                }
            }
        )*
    };
}

define_id! {
    /// Opaque identifier of one cache entry.
    ///
    /// A tensor id names both the payload file in the cache directory and its advisory lock file in the lock
    /// directory.
    TensorId,
    /// Identity of an installed model, as named by its manifest.
    ModelId,
}

impl TensorId {
    /// Whether the id can name a single entry inside a directory.
    ///
    /// Ids read from a directory listing always can. Ids handed in from elsewhere must not escape the cache or
    /// lock directory.
    pub fn is_plain_file_name(&self) -> bool {
        !self.0.is_empty() && self.0 != "." && self.0 != ".." && !self.0.contains(['/', '\0'])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_borrow_lookup() {
        let set: HashSet<TensorId> = ["a", "b"].into_iter().map(TensorId::from).collect();
        assert!(set.contains("a"));
        assert!(!set.contains("c"));
    }

    #[test]
    fn test_plain_file_name() {
        assert!(TensorId::from("resnet50.conv1.weight").is_plain_file_name());
        assert!(!TensorId::from("").is_plain_file_name());
        assert!(!TensorId::from("..").is_plain_file_name());
        assert!(!TensorId::from("../etc/passwd").is_plain_file_name());
    }
}
