//! A minimal structural analog of a Remote Execution API `ActionResult`:
//! just enough shape for `GetValidatedActionResult` to walk the CAS
//! references an AC entry makes, without pulling in a protobuf toolchain.
//! The wire encoding AC entries actually use on the network is a frontend
//! concern; the core only needs something to decode into and validate.

use serde::{Deserialize, Serialize};

use crate::digest::Digest;

/// A single output file an action produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFile {
    pub path: String,
    pub digest: Digest,
    #[serde(default)]
    pub is_executable: bool,
}

/// An output directory, addressed by the digest of its serialized `Tree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDirectory {
    pub path: String,
    pub tree_digest: Digest,
}

/// A directory node inside a `Tree`: its own files plus nested directories,
/// recursively, each referencing further CAS children.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DirectoryNode {
    #[serde(default)]
    pub files: Vec<OutputFile>,
    #[serde(default)]
    pub directories: Vec<DirectoryNode>,
}

/// The merkle tree an [`OutputDirectory`] digest resolves to.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Tree {
    pub root: DirectoryNode,
    #[serde(default)]
    pub children: Vec<DirectoryNode>,
}

/// The decoded contents of an AC entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ActionResult {
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
    #[serde(default)]
    pub output_directories: Vec<OutputDirectory>,
    pub stdout_digest: Option<Digest>,
    pub stderr_digest: Option<Digest>,
    pub exit_code: i32,
}

impl ActionResult {
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Every CAS digest this result transitively references: output file
    /// contents, output directory trees (and everything nested in them),
    /// and stdout/stderr.
    pub fn referenced_digests(&self) -> Vec<Digest> {
        let mut out = Vec::new();
        for f in &self.output_files {
            out.push(f.digest.clone());
        }
        for d in &self.output_directories {
            out.push(d.tree_digest.clone());
        }
        if let Some(d) = &self.stdout_digest {
            out.push(d.clone());
        }
        if let Some(d) = &self.stderr_digest {
            out.push(d.clone());
        }
        out
    }

    /// Every CAS digest a resolved `Tree` (fetched separately, via its
    /// `tree_digest` above) transitively references.
    pub fn tree_referenced_digests(tree: &Tree) -> Vec<Digest> {
        let mut out = Vec::new();
        collect_directory_digests(&tree.root, &mut out);
        for child in &tree.children {
            collect_directory_digests(child, &mut out);
        }
        out
    }
}

fn collect_directory_digests(node: &DirectoryNode, out: &mut Vec<Digest>) {
    for f in &node.files {
        out.push(f.digest.clone());
    }
    for d in &node.directories {
        collect_directory_digests(d, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let result = ActionResult {
            output_files: vec![OutputFile {
                path: "out.bin".into(),
                digest: Digest::new("abc123", 10),
                is_executable: false,
            }],
            output_directories: vec![],
            stdout_digest: Some(Digest::new("deadbeef", 4)),
            stderr_digest: None,
            exit_code: 0,
        };
        let bytes = result.encode().unwrap();
        let back = ActionResult::decode(&bytes).unwrap();
        assert_eq!(back.output_files.len(), 1);
        assert_eq!(back.referenced_digests().len(), 2);
    }

    #[test]
    fn tree_digests_are_collected_recursively() {
        let tree = Tree {
            root: DirectoryNode {
                files: vec![OutputFile { path: "a".into(), digest: Digest::new("h1", 1), is_executable: false }],
                directories: vec![DirectoryNode {
                    files: vec![OutputFile { path: "b".into(), digest: Digest::new("h2", 2), is_executable: false }],
                    directories: vec![],
                }],
            },
            children: vec![],
        };
        let digests = ActionResult::tree_referenced_digests(&tree);
        assert_eq!(digests.len(), 2);
    }
}
