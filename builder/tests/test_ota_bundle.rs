// Licensed under the Apache-2.0 license

use fw_builder::ota_image::sha256;
use fw_builder::{ota_image_create, ota_image_verify, BuildError};
use ota_image::{parse_bundle, ABSENT_DIGEST, FIRMWARE_VERSION_OFFSET, OTA_HEADER_SIZE};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_input(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_bundle_without_static_assets() {
    let dir = TempDir::new().unwrap();
    let app = write_input(dir.path(), "app.bin", b"APP");
    let ota = write_input(dir.path(), "ota_assets.bin", b"OTA");
    let output = dir.path().join("firmware.bin");

    ota_image_create("1.2.3", &output, &app, &ota, None).unwrap();

    let data = fs::read(&output).unwrap();
    assert_eq!(data.len(), OTA_HEADER_SIZE + 6);
    assert_eq!(
        &data[FIRMWARE_VERSION_OFFSET..FIRMWARE_VERSION_OFFSET + 5],
        b"1.2.3"
    );

    let bundle = parse_bundle(&data).unwrap();
    assert_eq!(bundle.header.app_size(), 3);
    assert_eq!(bundle.header.ota_assets_size(), 3);
    assert!(!bundle.header.has_static_assets());
    assert_eq!(bundle.header.static_assets_size(), 0);
    assert_eq!(bundle.header.static_assets_sha256, ABSENT_DIGEST);
    assert_eq!(bundle.app, b"APP");
    assert_eq!(bundle.ota_assets, b"OTA");
    assert!(bundle.static_assets.is_none());

    ota_image_verify(&output).unwrap();
}

#[test]
fn test_bundle_with_static_assets_round_trips() {
    let dir = TempDir::new().unwrap();
    let app_bytes: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
    let ota_bytes = vec![0xa5u8; 4096];
    let static_bytes: Vec<u8> = b"\xff\xfe\x00static".repeat(100);
    let app = write_input(dir.path(), "app.bin", &app_bytes);
    let ota = write_input(dir.path(), "ota_assets.bin", &ota_bytes);
    let stat = write_input(dir.path(), "static_assets.bin", &static_bytes);
    let output = dir.path().join("firmware.bin");

    ota_image_create("10.0.1-rc.2", &output, &app, &ota, Some(&stat)).unwrap();

    let data = fs::read(&output).unwrap();
    let bundle = parse_bundle(&data).unwrap();
    let header = bundle.header;
    assert_eq!(header.app_size() as usize, app_bytes.len());
    assert_eq!(header.ota_assets_size() as usize, ota_bytes.len());
    assert!(header.has_static_assets());
    assert_eq!(header.static_assets_size() as usize, static_bytes.len());
    assert_eq!(header.firmware_version(), Some("10.0.1-rc.2"));

    assert_eq!(sha256(bundle.app), header.app_sha256);
    assert_eq!(sha256(bundle.ota_assets), header.ota_assets_sha256);
    assert_eq!(sha256(bundle.static_assets.unwrap()), header.static_assets_sha256);
    assert_eq!(bundle.static_assets.unwrap(), &static_bytes[..]);

    ota_image_verify(&output).unwrap();
}

#[test]
fn test_malformed_version_leaves_output_untouched() {
    let dir = TempDir::new().unwrap();
    let app = write_input(dir.path(), "app.bin", b"APP");
    let ota = write_input(dir.path(), "ota_assets.bin", b"OTA");
    let output = write_input(dir.path(), "firmware.bin", b"previous build");

    let err = ota_image_create("not-a-version", &output, &app, &ota, None).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidVersion { .. })
    ));
    assert_eq!(fs::read(&output).unwrap(), b"previous build");

    let fresh = dir.path().join("never_written.bin");
    assert!(ota_image_create("1.2", &fresh, &app, &ota, None).is_err());
    assert!(!fresh.exists());
}

#[test]
fn test_missing_input_file() {
    let dir = TempDir::new().unwrap();
    let app = write_input(dir.path(), "app.bin", b"APP");
    let output = dir.path().join("firmware.bin");

    let err = ota_image_create(
        "1.2.3",
        &output,
        &app,
        &dir.path().join("missing_ota.bin"),
        None,
    )
    .unwrap_err();
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingInput { what, .. }) => assert_eq!(*what, "OTA assets binary"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!output.exists());

    let ota = write_input(dir.path(), "ota_assets.bin", b"OTA");
    assert!(ota_image_create(
        "1.2.3",
        &output,
        &app,
        &ota,
        Some(&dir.path().join("missing_static.bin"))
    )
    .is_err());
    assert!(!output.exists());
}

#[test]
fn test_verify_rejects_tampered_bundle() {
    let dir = TempDir::new().unwrap();
    let app = write_input(dir.path(), "app.bin", b"APPLICATION");
    let ota = write_input(dir.path(), "ota_assets.bin", b"OTA");
    let output = dir.path().join("firmware.bin");
    ota_image_create("0.1.0", &output, &app, &ota, None).unwrap();

    let mut data = fs::read(&output).unwrap();
    data.push(0);
    fs::write(&output, &data).unwrap();
    assert!(ota_image_verify(&output).is_err());

    data.pop();
    data[OTA_HEADER_SIZE + 2] = b'x';
    fs::write(&output, &data).unwrap();
    assert!(ota_image_verify(&output).is_err());
}
