use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use zip::ZipArchive;

use crate::app::adb::locator::expand_home;

/// APK paths ready for `install`/`install-multiple`. Extracted split bundles
/// live in `_temp_dir` and are removed when this value drops.
pub struct PreparedApk {
    pub apk_paths: Vec<String>,
    _temp_dir: Option<TempDir>,
}

pub fn is_split_bundle(path: &str) -> bool {
    let lower = path.to_lowercase();
    lower.ends_with(".apks") || lower.ends_with(".xapk")
}

pub fn normalize_apk_path(path: &str) -> PathBuf {
    PathBuf::from(expand_home(path.trim()))
}

/// Checks that `path` exists and is a readable zip archive before anything is spawned.
pub fn validate_apk(path: &Path) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!("APK file not found: {}", path.display()));
    }
    let file = File::open(path).map_err(|err| format!("Failed to open APK: {err}"))?;
    ZipArchive::new(file).map_err(|err| format!("Invalid APK: {err}"))?;
    Ok(())
}

pub fn prepare_apk(path: &str) -> Result<PreparedApk, String> {
    let normalized = normalize_apk_path(path);
    validate_apk(&normalized)?;
    let display = normalized.to_string_lossy().to_string();
    if is_split_bundle(&display) {
        return extract_split_apks(&normalized);
    }
    Ok(PreparedApk {
        apk_paths: vec![display],
        _temp_dir: None,
    })
}

fn extract_split_apks(path: &Path) -> Result<PreparedApk, String> {
    let file = File::open(path).map_err(|err| format!("Failed to open bundle: {err}"))?;
    let mut archive = ZipArchive::new(file).map_err(|err| format!("Invalid bundle: {err}"))?;
    let temp_dir = TempDir::new().map_err(|err| format!("Failed to create temp dir: {err}"))?;
    let mut extracted = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| format!("Failed to read bundle: {err}"))?;
        if !entry.name().to_lowercase().ends_with(".apk") {
            continue;
        }
        let Some(file_name) = Path::new(entry.name()).file_name().map(|n| n.to_owned()) else {
            continue;
        };
        let target = temp_dir.path().join(file_name);
        let mut output =
            File::create(&target).map_err(|err| format!("Failed to extract apk: {err}"))?;
        io::copy(&mut entry, &mut output).map_err(|err| format!("Failed to write apk: {err}"))?;
        extracted.push(target.to_string_lossy().to_string());
    }

    if extracted.is_empty() {
        return Err("Bundle contains no APK files".to_string());
    }

    // base.apk goes first; install-multiple expects the base split ahead of configs.
    extracted.sort_by_key(|path| {
        let name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("")
            .to_lowercase();
        (!name.starts_with("base"), name)
    });

    Ok(PreparedApk {
        apk_paths: extracted,
        _temp_dir: Some(temp_dir),
    })
}

#[cfg(test)]
pub(crate) fn write_test_apk(path: &Path, entries: &[&str]) {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let file = File::create(path).expect("create apk");
    let mut zip = zip::ZipWriter::new(file);
    for entry in entries {
        zip.start_file(*entry, SimpleFileOptions::default())
            .expect("start entry");
        zip.write_all(entry.as_bytes()).expect("write entry");
    }
    zip.finish().expect("finish apk");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_and_non_zip_files() {
        let tmp = TempDir::new().expect("tmp");
        let missing = tmp.path().join("missing.apk");
        assert!(validate_apk(&missing).unwrap_err().contains("not found"));

        let bogus = tmp.path().join("bogus.apk");
        std::fs::write(&bogus, b"not a zip").expect("write");
        assert!(validate_apk(&bogus).unwrap_err().contains("Invalid APK"));
    }

    #[test]
    fn single_apk_is_passed_through() {
        let tmp = TempDir::new().expect("tmp");
        let apk = tmp.path().join("app.apk");
        write_test_apk(&apk, &["AndroidManifest.xml"]);
        let prepared = prepare_apk(apk.to_str().unwrap()).expect("prepare");
        assert_eq!(prepared.apk_paths, vec![apk.to_string_lossy().to_string()]);
    }

    #[test]
    fn extracts_split_bundle_with_base_first() {
        let tmp = TempDir::new().expect("tmp");
        let bundle = tmp.path().join("bundle.apks");
        write_test_apk(&bundle, &["splits/config.arm64_v8a.apk", "toc.pb", "splits/base-master.apk"]);

        let prepared = prepare_apk(bundle.to_str().unwrap()).expect("extract");
        assert_eq!(prepared.apk_paths.len(), 2);
        assert!(prepared.apk_paths[0].ends_with("base-master.apk"));
        assert!(Path::new(&prepared.apk_paths[1]).exists());
    }

    #[test]
    fn bundle_without_apks_is_rejected() {
        let tmp = TempDir::new().expect("tmp");
        let bundle = tmp.path().join("empty.xapk");
        write_test_apk(&bundle, &["manifest.json"]);
        let err = prepare_apk(bundle.to_str().unwrap()).err().expect("error");
        assert!(err.contains("no APK"));
    }
}
