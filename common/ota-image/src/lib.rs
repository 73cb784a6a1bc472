// Licensed under the Apache-2.0 license
#![no_std]

//! Binary layout of an OTA bundle.
//!
//! A bundle is an [`OtaHeader`] followed by the application image, the OTA
//! assets filesystem image and, when `has_static_assets` is set, the static
//! assets filesystem image. The header is shared with the firmware that
//! receives the update, so every field offset is fixed here and checked at
//! compile time. All integers are little-endian and every field is
//! byte-aligned; the three bytes after `has_static_assets` are explicit
//! reserved bytes, not compiler padding.

use core::fmt;
use core::mem::{offset_of, size_of};

use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const SHA256_LEN: usize = 32;
pub const FIRMWARE_VERSION_LEN: usize = 20;
pub const OTA_HEADER_SIZE: usize = 132;

pub const APP_SIZE_OFFSET: usize = 0;
pub const APP_SHA256_OFFSET: usize = 4;
pub const OTA_ASSETS_SIZE_OFFSET: usize = 36;
pub const OTA_ASSETS_SHA256_OFFSET: usize = 40;
pub const HAS_STATIC_ASSETS_OFFSET: usize = 72;
pub const STATIC_ASSETS_SIZE_OFFSET: usize = 76;
pub const STATIC_ASSETS_SHA256_OFFSET: usize = 80;
pub const FIRMWARE_VERSION_OFFSET: usize = 112;

/// Digest stored for an absent static assets payload.
pub const ABSENT_DIGEST: [u8; SHA256_LEN] = [0; SHA256_LEN];

#[repr(C)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct OtaHeader {
    pub app_size: U32<LittleEndian>,
    pub app_sha256: [u8; SHA256_LEN],
    pub ota_assets_size: U32<LittleEndian>,
    pub ota_assets_sha256: [u8; SHA256_LEN],
    pub has_static_assets: u8,
    pub reserved: [u8; 3],
    pub static_assets_size: U32<LittleEndian>,
    pub static_assets_sha256: [u8; SHA256_LEN],
    pub firmware_version: [u8; FIRMWARE_VERSION_LEN],
}

const _: () = {
    assert!(size_of::<OtaHeader>() == OTA_HEADER_SIZE);
    assert!(offset_of!(OtaHeader, app_size) == APP_SIZE_OFFSET);
    assert!(offset_of!(OtaHeader, app_sha256) == APP_SHA256_OFFSET);
    assert!(offset_of!(OtaHeader, ota_assets_size) == OTA_ASSETS_SIZE_OFFSET);
    assert!(offset_of!(OtaHeader, ota_assets_sha256) == OTA_ASSETS_SHA256_OFFSET);
    assert!(offset_of!(OtaHeader, has_static_assets) == HAS_STATIC_ASSETS_OFFSET);
    assert!(offset_of!(OtaHeader, static_assets_size) == STATIC_ASSETS_SIZE_OFFSET);
    assert!(offset_of!(OtaHeader, static_assets_sha256) == STATIC_ASSETS_SHA256_OFFSET);
    assert!(offset_of!(OtaHeader, firmware_version) == FIRMWARE_VERSION_OFFSET);
};

impl OtaHeader {
    pub fn app_size(&self) -> u32 {
        self.app_size.get()
    }

    pub fn ota_assets_size(&self) -> u32 {
        self.ota_assets_size.get()
    }

    pub fn has_static_assets(&self) -> bool {
        self.has_static_assets != 0
    }

    pub fn static_assets_size(&self) -> u32 {
        self.static_assets_size.get()
    }

    /// The version string up to the first NUL byte, if it is valid UTF-8.
    pub fn firmware_version(&self) -> Option<&str> {
        let len = self
            .firmware_version
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(FIRMWARE_VERSION_LEN);
        core::str::from_utf8(&self.firmware_version[..len]).ok()
    }

    /// Total length of a bundle carrying this header.
    pub fn bundle_len(&self) -> u64 {
        let static_len = if self.has_static_assets() {
            self.static_assets_size() as u64
        } else {
            0
        };
        OTA_HEADER_SIZE as u64 + self.app_size() as u64 + self.ota_assets_size() as u64 + static_len
    }
}

/// A parsed bundle borrowing its payloads from the underlying buffer.
#[derive(Debug, Clone, Copy)]
pub struct OtaBundle<'a> {
    pub header: OtaHeader,
    pub app: &'a [u8],
    pub ota_assets: &'a [u8],
    pub static_assets: Option<&'a [u8]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleError {
    HeaderTooShort { actual: usize },
    Truncated { expected: u64, actual: usize },
    TrailingData { expected: u64, actual: usize },
    /// `has_static_assets` is clear but the size or digest field is not zero.
    StaleStaticAssetsFields,
    ReservedNotZero,
}

impl fmt::Display for BundleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeaderTooShort { actual } => write!(
                f,
                "{actual} bytes is too small to contain the {OTA_HEADER_SIZE}-byte header"
            ),
            Self::Truncated { expected, actual } => write!(
                f,
                "bundle is truncated: header declares {expected} bytes, found {actual}"
            ),
            Self::TrailingData { expected, actual } => write!(
                f,
                "bundle has trailing data: header declares {expected} bytes, found {actual}"
            ),
            Self::StaleStaticAssetsFields => {
                f.write_str("static assets are absent but their size or digest is set")
            }
            Self::ReservedNotZero => f.write_str("reserved header bytes are not zero"),
        }
    }
}

/// Splits `bytes` into header and payloads according to the declared sizes.
pub fn parse_bundle(bytes: &[u8]) -> Result<OtaBundle<'_>, BundleError> {
    let (header, body) = OtaHeader::read_from_prefix(bytes).map_err(|_| {
        BundleError::HeaderTooShort {
            actual: bytes.len(),
        }
    })?;
    if header.reserved != [0; 3] {
        return Err(BundleError::ReservedNotZero);
    }
    if !header.has_static_assets()
        && (header.static_assets_size() != 0 || header.static_assets_sha256 != ABSENT_DIGEST)
    {
        return Err(BundleError::StaleStaticAssetsFields);
    }

    let expected = header.bundle_len();
    if (bytes.len() as u64) < expected {
        return Err(BundleError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    if (bytes.len() as u64) > expected {
        return Err(BundleError::TrailingData {
            expected,
            actual: bytes.len(),
        });
    }

    let (app, rest) = body.split_at(header.app_size() as usize);
    let (ota_assets, rest) = rest.split_at(header.ota_assets_size() as usize);
    let static_assets = header.has_static_assets().then_some(rest);

    Ok(OtaBundle {
        header,
        app,
        ota_assets,
        static_assets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(app: u32, ota: u32, static_assets: Option<u32>) -> OtaHeader {
        let mut version = [0u8; FIRMWARE_VERSION_LEN];
        version[..5].copy_from_slice(b"1.2.3");
        OtaHeader {
            app_size: U32::new(app),
            app_sha256: [0xaa; SHA256_LEN],
            ota_assets_size: U32::new(ota),
            ota_assets_sha256: [0xbb; SHA256_LEN],
            has_static_assets: static_assets.is_some() as u8,
            reserved: [0; 3],
            static_assets_size: U32::new(static_assets.unwrap_or(0)),
            static_assets_sha256: if static_assets.is_some() {
                [0xcc; SHA256_LEN]
            } else {
                ABSENT_DIGEST
            },
            firmware_version: version,
        }
    }

    #[test]
    fn test_field_bytes_land_at_fixed_offsets() {
        let h = header(0x0403_0201, 7, Some(9));
        let bytes = h.as_bytes();
        assert_eq!(bytes.len(), OTA_HEADER_SIZE);
        assert_eq!(bytes[APP_SIZE_OFFSET..][..4], [1, 2, 3, 4]);
        assert_eq!(bytes[OTA_ASSETS_SIZE_OFFSET..][..4], [7, 0, 0, 0]);
        assert_eq!(bytes[HAS_STATIC_ASSETS_OFFSET], 1);
        assert_eq!(bytes[HAS_STATIC_ASSETS_OFFSET + 1..][..3], [0, 0, 0]);
        assert_eq!(bytes[STATIC_ASSETS_SIZE_OFFSET..][..4], [9, 0, 0, 0]);
        assert_eq!(bytes[FIRMWARE_VERSION_OFFSET..][..6], *b"1.2.3\0");
    }

    #[test]
    fn test_firmware_version_stops_at_nul() {
        assert_eq!(header(0, 0, None).firmware_version(), Some("1.2.3"));

        let mut full = header(0, 0, None);
        full.firmware_version = *b"1.2.3-rc.1+build.999";
        assert_eq!(full.firmware_version(), Some("1.2.3-rc.1+build.999"));
    }

    #[test]
    fn test_parse_bundle_slices_payloads() {
        let h = header(3, 2, Some(1));
        let mut buf = [0u8; OTA_HEADER_SIZE + 6];
        buf[..OTA_HEADER_SIZE].copy_from_slice(h.as_bytes());
        buf[OTA_HEADER_SIZE..].copy_from_slice(b"APPOTS");

        let bundle = parse_bundle(&buf).unwrap();
        assert_eq!(bundle.header, h);
        assert_eq!(bundle.app, b"APP");
        assert_eq!(bundle.ota_assets, b"OT");
        assert_eq!(bundle.static_assets, Some(&b"S"[..]));
    }

    #[test]
    fn test_parse_bundle_rejects_bad_lengths() {
        let h = header(3, 3, None);
        let mut buf = [0u8; OTA_HEADER_SIZE + 7];
        buf[..OTA_HEADER_SIZE].copy_from_slice(h.as_bytes());

        assert_eq!(
            parse_bundle(&buf[..10]).unwrap_err(),
            BundleError::HeaderTooShort { actual: 10 }
        );
        assert_eq!(
            parse_bundle(&buf[..OTA_HEADER_SIZE + 5]).unwrap_err(),
            BundleError::Truncated {
                expected: OTA_HEADER_SIZE as u64 + 6,
                actual: OTA_HEADER_SIZE + 5
            }
        );
        assert_eq!(
            parse_bundle(&buf).unwrap_err(),
            BundleError::TrailingData {
                expected: OTA_HEADER_SIZE as u64 + 6,
                actual: OTA_HEADER_SIZE + 7
            }
        );
        assert!(parse_bundle(&buf[..OTA_HEADER_SIZE + 6]).is_ok());
    }

    #[test]
    fn test_parse_bundle_rejects_inconsistent_static_fields() {
        let mut h = header(0, 0, None);
        h.static_assets_size = U32::new(4);
        assert_eq!(
            parse_bundle(h.as_bytes()).unwrap_err(),
            BundleError::StaleStaticAssetsFields
        );

        let mut h = header(0, 0, None);
        h.reserved = [0, 1, 0];
        assert_eq!(
            parse_bundle(h.as_bytes()).unwrap_err(),
            BundleError::ReservedNotZero
        );
    }
}
