//! Fonts and font packages
//!
//! A [`Font`] holds raw sfnt data (TrueType or OpenType). Rasterization
//! happens elsewhere; loading only validates the header and table directory.
//!
//! A [`FontPackage`] is a JSON list of named fonts at given sizes:
//!
//! ```json
//! [
//!     { "name": "body", "size": 16, "path": "fonts/regular.ttf" },
//!     { "name": "title", "size": 32, "path": "fonts/regular.ttf" }
//! ]
//! ```

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::assets::{
    BindContext, BindError, LoadError, PopulateContext, ReferenceToken, Resource, ResourceHandle,
    ResourceStream,
};

const SFNT_HEADER_LEN: usize = 12;
const TABLE_RECORD_LEN: usize = 16;

/// Outline flavour declared by the sfnt header
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FontFormat {
    #[default]
    TrueType,
    OpenType,
}

/// Raw font data with a validated table directory
#[derive(Debug, Default)]
pub struct Font {
    format: FontFormat,
    tables: Vec<[u8; 4]>,
    data: Vec<u8>,
}

impl Font {
    #[must_use]
    pub const fn format(&self) -> FontFormat {
        self.format
    }

    /// Number of tables in the directory
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Check for a table by its four-byte tag, e.g. `"cmap"`
    #[must_use]
    pub fn has_table(&self, tag: &str) -> bool {
        self.tables.iter().any(|t| t.as_slice() == tag.as_bytes())
    }

    /// The full font file
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

fn parse_header(data: &[u8]) -> Result<(FontFormat, Vec<[u8; 4]>), LoadError> {
    if data.len() < SFNT_HEADER_LEN {
        return Err(LoadError::Decode(format!(
            "font is {} bytes, shorter than the sfnt header",
            data.len()
        )));
    }

    let version = [data[0], data[1], data[2], data[3]];
    let format = match version {
        [0x00, 0x01, 0x00, 0x00] | [b't', b'r', b'u', b'e'] => FontFormat::TrueType,
        [b'O', b'T', b'T', b'O'] => FontFormat::OpenType,
        other => {
            return Err(LoadError::Decode(format!(
                "unrecognized sfnt version {other:02x?}"
            )));
        }
    };

    let count = usize::from(u16::from_be_bytes([data[4], data[5]]));
    let directory_end = SFNT_HEADER_LEN + count * TABLE_RECORD_LEN;
    if data.len() < directory_end {
        return Err(LoadError::Invalid(format!(
            "table directory declares {count} tables but the file ends at {}",
            data.len()
        )));
    }

    let tables = data[SFNT_HEADER_LEN..directory_end]
        .chunks_exact(TABLE_RECORD_LEN)
        .map(|record| [record[0], record[1], record[2], record[3]])
        .collect();
    Ok((format, tables))
}

impl Resource for Font {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        _ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        let data = stream.read_all()?;
        let (format, tables) = parse_header(&data)?;

        self.format = format;
        self.tables = tables;
        self.data = data;
        Ok(())
    }

    fn teardown(&mut self) {
        self.tables.clear();
        self.data = Vec::new();
    }
}

/// One entry of a font package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontEntry {
    pub name: String,
    pub size: u32,
    /// Path of the font file in the package's assembly
    pub path: String,
}

/// Named fonts at fixed sizes, resolved through the binding library
#[derive(Debug, Default)]
pub struct FontPackage {
    entries: Vec<FontEntry>,
    fonts: SmallVec<[ReferenceToken<Font>; 4]>,
}

impl FontPackage {
    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry names in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Entry by name
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&FontEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Font for an entry, available once the package has been bound
    #[must_use]
    pub fn font(&self, name: &str) -> Option<ResourceHandle<Font>> {
        let index = self.entries.iter().position(|entry| entry.name == name)?;
        self.fonts.get(index).map(ReferenceToken::handle)
    }

    /// Check if the fonts have been resolved
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.entries.is_empty() && self.fonts.len() == self.entries.len()
    }
}

impl Resource for FontPackage {
    fn populate(
        &mut self,
        stream: &mut ResourceStream,
        _ctx: &PopulateContext<'_>,
    ) -> Result<(), LoadError> {
        let text = stream.read_text()?;
        let entries: Vec<FontEntry> =
            serde_json::from_str(&text).map_err(|e| LoadError::Decode(e.to_string()))?;

        if let Some(entry) = entries.iter().find(|entry| entry.size == 0) {
            return Err(LoadError::Invalid(format!("font `{}` has size 0", entry.name)));
        }

        self.entries = entries;
        Ok(())
    }

    fn bind(&mut self, ctx: &mut BindContext<'_>) -> Result<(), BindError> {
        if self.is_bound() {
            return Ok(());
        }

        let mut fonts = SmallVec::with_capacity(self.entries.len());
        for entry in &self.entries {
            fonts.push(ctx.acquire::<Font>(&entry.path)?);
        }
        self.fonts = fonts;
        Ok(())
    }

    fn teardown(&mut self) {
        self.fonts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::{AssemblyStore, EmbeddedSource, Registry, ResourceError};

    /// A header with the given version tag and table tags, no table data
    fn sfnt(version: &[u8; 4], tags: &[&[u8; 4]]) -> Vec<u8> {
        let mut data = version.to_vec();
        data.extend_from_slice(&(tags.len() as u16).to_be_bytes());
        data.extend_from_slice(&[0; 6]);
        for tag in tags {
            data.extend_from_slice(*tag);
            data.extend_from_slice(&[0; 12]);
        }
        data
    }

    #[test]
    fn test_header_validation() {
        let (format, tables) = parse_header(&sfnt(&[0, 1, 0, 0], &[b"cmap", b"glyf"])).unwrap();
        assert_eq!(format, FontFormat::TrueType);
        assert_eq!(tables.len(), 2);

        let (format, _) = parse_header(&sfnt(b"OTTO", &[b"CFF "])).unwrap();
        assert_eq!(format, FontFormat::OpenType);

        assert!(matches!(parse_header(b"wOFF"), Err(LoadError::Decode(_))));
        assert!(matches!(
            parse_header(&sfnt(b"wOFF", &[])),
            Err(LoadError::Decode(_))
        ));

        let mut truncated = sfnt(&[0, 1, 0, 0], &[b"cmap"]);
        truncated.truncate(20);
        assert!(matches!(parse_header(&truncated), Err(LoadError::Invalid(_))));
    }

    #[test]
    fn test_package_binds_fonts_through_library() {
        let package = serde_json::to_vec(&vec![
            FontEntry {
                name: "body".to_string(),
                size: 16,
                path: "fonts/regular.ttf".to_string(),
            },
            FontEntry {
                name: "title".to_string(),
                size: 32,
                path: "fonts/regular.ttf".to_string(),
            },
        ])
        .unwrap();

        let registry = Registry::new();
        let mut store = AssemblyStore::new();
        let assembly = store
            .register(
                "game",
                EmbeddedSource::new()
                    .with_bytes("fonts/ui.json", package)
                    .with_bytes("fonts/regular.ttf", sfnt(&[0, 1, 0, 0], &[b"cmap", b"head"])),
            )
            .unwrap();

        let mut library = registry.create_library();
        let ui = library.load::<FontPackage>(&assembly, "fonts/ui.json").unwrap();
        let ui = ui.get().unwrap();
        assert!(ui.is_bound());
        assert_eq!(ui.names().collect::<Vec<_>>(), vec!["body", "title"]);
        assert_eq!(ui.entry("title").map(|entry| entry.size), Some(32));

        let body = ui.font("body").unwrap();
        let title = ui.font("title").unwrap();
        assert_eq!(body, title);
        assert!(body.get().unwrap().has_table("head"));
        // library, plus one token per package entry
        assert_eq!(registry.reference_count(body.id()), Some(3));
    }

    #[test]
    fn test_missing_font_fails_bind() {
        let package = br#"[{ "name": "body", "size": 12, "path": "fonts/none.ttf" }]"#;
        let registry = Registry::new();
        let mut store = AssemblyStore::new();
        let assembly = store
            .register("game", EmbeddedSource::new().with("ui.json", package))
            .unwrap();

        let mut library = registry.create_library();
        let err = library.load::<FontPackage>(&assembly, "ui.json").unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Bind {
                source: BindError::Dependency { .. },
                ..
            }
        ));
    }
}
