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

use std::{fs, path::Path};

use crate::error::{Error, Result};

/// Read the identity of this node from `path`.
///
/// Surrounding whitespace is trimmed. An unreadable or empty source is an error.
pub fn read_node_identity(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| Error::NodeIdentity {
        path: path.to_path_buf(),
        source,
    })?;
    let node = content.trim();
    if node.is_empty() {
        return Err(Error::EmptyNodeIdentity);
    }
    Ok(node.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_node_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hostname");

        assert!(matches!(read_node_identity(&path), Err(Error::NodeIdentity { .. })));

        fs::write(&path, "  \n").unwrap();
        assert!(matches!(read_node_identity(&path), Err(Error::EmptyNodeIdentity)));

        fs::write(&path, "worker-3\n").unwrap();
        assert_eq!(read_node_identity(&path).unwrap(), "worker-3");
    }
}
