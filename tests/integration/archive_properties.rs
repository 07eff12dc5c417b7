//! Property tests for the bundle archive format

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Read;

use flate2::read::GzDecoder;
use fuzzkit::archive::{add_dir_to_file_map, extract, write_archive, FileMap};
use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use tempfile::TempDir;

use super::common::fixtures::write_file;

/// Relative file paths mapped to their contents. Directory names start
/// with `d` and file names with `f`, so no path is both.
fn file_tree() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    btree_map("(d[ab]/){0,2}f[a-c]{1,2}", vec(any::<u8>(), 0..256), 1..12)
}

fn materialize(tree: &BTreeMap<String, Vec<u8>>) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (path, contents) in tree {
        write_file(&dir.path().join(path), contents);
    }
    dir
}

fn subdirectories(tree: &BTreeMap<String, Vec<u8>>) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    for path in tree.keys() {
        let parts: Vec<_> = path.split('/').collect();
        for depth in 1..parts.len() {
            dirs.insert(parts[..depth].join("/"));
        }
    }
    dirs
}

fn entry_paths(archive: &[u8]) -> Vec<String> {
    let mut archive = tar::Archive::new(GzDecoder::new(archive));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            entry.path().unwrap().to_string_lossy().into_owned()
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn archives_are_reproducible(tree in file_tree()) {
        let source = materialize(&tree);
        let mut file_map = FileMap::new();
        add_dir_to_file_map(&mut file_map, "bundle", source.path()).unwrap();

        let first = write_archive(Vec::new(), &file_map).unwrap();
        let second = write_archive(Vec::new(), &file_map).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn every_file_and_directory_gets_one_entry(tree in file_tree()) {
        let source = materialize(&tree);
        let mut file_map = FileMap::new();
        add_dir_to_file_map(&mut file_map, "bundle", source.path()).unwrap();

        // Root entry included
        let expected = tree.len() + subdirectories(&tree).len() + 1;
        prop_assert_eq!(file_map.len(), expected);

        let archive = write_archive(Vec::new(), &file_map).unwrap();
        let paths = entry_paths(&archive);
        prop_assert_eq!(paths.len(), expected);
        let mut sorted = paths.clone();
        sorted.sort();
        prop_assert_eq!(paths, sorted);
    }

    #[test]
    fn extracting_restores_the_tree(tree in file_tree()) {
        let source = materialize(&tree);
        let mut file_map = FileMap::new();
        add_dir_to_file_map(&mut file_map, "", source.path()).unwrap();
        prop_assert_eq!(file_map.len(), tree.len() + subdirectories(&tree).len());

        let out = TempDir::new().unwrap();
        let bundle = out.path().join("bundle.tar.gz");
        let archive = write_archive(Vec::new(), &file_map).unwrap();
        fs::write(&bundle, archive).unwrap();

        let dest = out.path().join("extracted");
        extract(&bundle, &dest).unwrap();
        for (path, contents) in &tree {
            let mut restored = Vec::new();
            fs::File::open(dest.join(path))
                .unwrap()
                .read_to_end(&mut restored)
                .unwrap();
            prop_assert_eq!(&restored, contents);
        }
    }
}
