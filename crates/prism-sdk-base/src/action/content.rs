// Copyright 2024 The prism-sdk Contributors
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

//! Media upload/download actions. Decoding the bytes is explicitly out of
//! scope; these actions only move bytes to and from the content repository.

use mime::Mime;
use serde::{Deserialize, Serialize};

/// Actions concerned with the content repository (media).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ContentAction {
    /// Upload a byte buffer, returning an `mxc://` URI on success.
    UploadContent {
        /// The bytes to upload.
        #[serde(with = "bytes_serde")]
        bytes: Vec<u8>,
        /// The declared content type.
        #[serde(with = "mime_serde")]
        content_type: Mime,
        /// A suggested filename.
        filename: Option<String>,
    },
    /// Download the full content behind an `mxc://` URI.
    GetContent {
        /// The content URI to fetch.
        mxc_uri: String,
    },
    /// Download a thumbnail of the content behind an `mxc://` URI.
    GetContentThumbnail {
        /// The content URI to fetch a thumbnail of.
        mxc_uri: String,
        /// Desired width in pixels.
        width: u32,
        /// Desired height in pixels.
        height: u32,
    },
}

mod mime_serde {
    use std::str::FromStr;

    use mime::Mime;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(mime: &Mime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(mime.as_ref())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Mime, D::Error> {
        let s = String::deserialize(deserializer)?;
        Mime::from_str(&s).map_err(D::Error::custom)
    }
}

mod bytes_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::decode(s).map_err(serde::de::Error::custom)
    }
}
