//! Device Identification
//!
//! The identity objects returned by Read Device Identification (FC43/14).
//! Objects 0x00-0x02 form the *basic* category, 0x03-0x06 the *regular*
//! category.

use crate::protocol::types::MAX_PDU_SIZE;
use bytes::Bytes;
use serde::Deserialize;

/// Longest object value a single FC43/14 response can carry: the PDU less
/// its seven header bytes and the object's id and length bytes.
pub const MAX_OBJECT_LEN: usize = MAX_PDU_SIZE - 9;

/// Object ids of the basic and regular identification categories.
pub mod object {
    pub const VENDOR_NAME: u8 = 0x00;
    pub const PRODUCT_CODE: u8 = 0x01;
    pub const MAJOR_MINOR_REVISION: u8 = 0x02;
    pub const VENDOR_URL: u8 = 0x03;
    pub const PRODUCT_NAME: u8 = 0x04;
    pub const MODEL_NAME: u8 = 0x05;
    pub const USER_APPLICATION_NAME: u8 = 0x06;

    /// Last object id of the basic category.
    pub const LAST_BASIC: u8 = MAJOR_MINOR_REVISION;

    /// Last object id of the regular category.
    pub const LAST_REGULAR: u8 = USER_APPLICATION_NAME;
}

/// Static identity of the device FlashBus presents itself as.
///
/// Empty fields are reported as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceIdentity {
    pub vendor_name: String,
    pub product_code: String,
    pub major_minor_revision: String,
    pub vendor_url: String,
    pub product_name: String,
    pub model_name: String,
    pub user_application_name: String,
}

impl DeviceIdentity {
    /// Overwrites every field of `self` for which `other` has a non-empty value.
    pub fn update(&mut self, other: &DeviceIdentity) {
        let pairs = [
            (&mut self.vendor_name, &other.vendor_name),
            (&mut self.product_code, &other.product_code),
            (&mut self.major_minor_revision, &other.major_minor_revision),
            (&mut self.vendor_url, &other.vendor_url),
            (&mut self.product_name, &other.product_name),
            (&mut self.model_name, &other.model_name),
            (&mut self.user_application_name, &other.user_application_name),
        ];
        for (mine, theirs) in pairs {
            if !theirs.is_empty() {
                mine.clone_from(theirs);
            }
        }
    }

    /// Returns the value of an identification object.
    pub fn object(&self, id: u8) -> Option<&str> {
        let value = match id {
            object::VENDOR_NAME => &self.vendor_name,
            object::PRODUCT_CODE => &self.product_code,
            object::MAJOR_MINOR_REVISION => &self.major_minor_revision,
            object::VENDOR_URL => &self.vendor_url,
            object::PRODUCT_NAME => &self.product_name,
            object::MODEL_NAME => &self.model_name,
            object::USER_APPLICATION_NAME => &self.user_application_name,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Returns the id and length of the first object longer than
    /// [`MAX_OBJECT_LEN`], if any.
    pub fn oversized_object(&self) -> Option<(u8, usize)> {
        (object::VENDOR_NAME..=object::LAST_REGULAR)
            .filter_map(|id| self.object(id).map(|value| (id, value.len())))
            .find(|(_, len)| *len > MAX_OBJECT_LEN)
    }

    /// Returns the objects `first..=last` as `(id, value)` pairs.
    ///
    /// Values are cut to [`MAX_OBJECT_LEN`] bytes.
    pub fn objects(&self, first: u8, last: u8) -> Vec<(u8, Bytes)> {
        (first..=last)
            .filter_map(|id| {
                self.object(id).map(|value| {
                    let value = value.as_bytes();
                    let len = value.len().min(MAX_OBJECT_LEN);
                    (id, Bytes::copy_from_slice(&value[..len]))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> DeviceIdentity {
        DeviceIdentity {
            vendor_name: "Acme".to_string(),
            product_code: "AC-1".to_string(),
            major_minor_revision: "1.0".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_only_overwrites_non_empty() {
        let mut identity = acme();
        identity.update(&DeviceIdentity {
            product_code: "AC-2".to_string(),
            model_name: "Roadrunner".to_string(),
            ..Default::default()
        });

        assert_eq!(identity.vendor_name, "Acme");
        assert_eq!(identity.product_code, "AC-2");
        assert_eq!(identity.model_name, "Roadrunner");
    }

    #[test]
    fn test_objects_basic_range() {
        let objects = acme().objects(object::VENDOR_NAME, object::LAST_BASIC);
        assert_eq!(
            objects,
            vec![
                (0x00, Bytes::from_static(b"Acme")),
                (0x01, Bytes::from_static(b"AC-1")),
                (0x02, Bytes::from_static(b"1.0")),
            ]
        );
    }

    #[test]
    fn test_unknown_object() {
        assert_eq!(acme().object(0x07), None);
        assert_eq!(acme().object(object::VENDOR_URL), Some(""));
    }

    #[test]
    fn test_oversized_object() {
        assert_eq!(acme().oversized_object(), None);

        let identity = DeviceIdentity {
            model_name: "m".repeat(MAX_OBJECT_LEN),
            vendor_url: "u".repeat(MAX_OBJECT_LEN + 1),
            ..acme()
        };
        assert_eq!(
            identity.oversized_object(),
            Some((object::VENDOR_URL, MAX_OBJECT_LEN + 1))
        );

        let objects = identity.objects(object::VENDOR_URL, object::MODEL_NAME);
        assert_eq!(objects[0].1.len(), MAX_OBJECT_LEN);
        assert_eq!(objects[2].1.len(), MAX_OBJECT_LEN);
    }

    #[test]
    fn test_deserialize_partial() {
        let identity: DeviceIdentity = toml::from_str(r#"vendor_name = "Acme""#).unwrap();
        assert_eq!(identity.vendor_name, "Acme");
        assert!(identity.product_code.is_empty());
    }
}
