//! Font lookup for the report renderer.
//!
//! Two concerns live here. [`FontResolver`] walks an ordered list of [`FontCandidate`]s and
//! registers the first usable one with a [`FontRegistry`], so that reports can be rendered in a
//! script the built-in PDF fonts cannot display. [`default_font_family`] locates the metric files
//! `genpdf` needs for the fallback family, which is emitted as the built-in Helvetica.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use genpdf::fonts::{self, Builtin, FontData, FontFamily};
use log::{debug, info, warn};
use lopdf::Document;
use printpdf::BuiltinFont;

use crate::config::{self, ReportConfig};
use crate::error::{ReportError, Result};

/// Name reported for reports rendered without a resolved font.
pub const DEFAULT_FONT_NAME: &str = "Helvetica";

/// Family whose files provide Helvetica-compatible metrics for the fallback font.
const METRIC_FAMILY_NAME: &str = "LiberationSans";

const METRIC_FONT_FILES: &[&str] = &[
    "LiberationSans-Regular.ttf",
    "LiberationSans-Bold.ttf",
    "LiberationSans-Italic.ttf",
    "LiberationSans-BoldItalic.ttf",
];

const BUILTIN_ENCODING: &str = "WinAnsiEncoding";

const UNPRINTABLE_REPLACEMENT: char = '?';

const SYSTEM_METRIC_DIRECTORIES: &[&str] = &[
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/truetype/liberation2",
    "/usr/share/fonts/liberation-sans",
    "/usr/share/fonts/liberation",
];

struct WindowsFontFiles {
    regular: &'static str,
    bold: &'static str,
    italic: &'static str,
    bold_italic: &'static str,
}

const WINDOWS_FONT_FILES: WindowsFontFiles = WindowsFontFiles {
    regular: "arial.ttf",
    bold: "arialbd.ttf",
    italic: "ariali.ttf",
    bold_italic: "arialbi.ttf",
};

/// A font that may be present on the local filesystem.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontCandidate {
    name: String,
    path: PathBuf,
}

impl FontCandidate {
    /// Creates a candidate with a logical name and a file location.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Logical name the font is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the font file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// A resolved, registered font.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FontAsset {
    name: String,
    path: PathBuf,
}

impl FontAsset {
    /// Creates a font asset.
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Logical name used to refer to the font while rendering.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the font file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl From<&FontCandidate> for FontAsset {
    fn from(candidate: &FontCandidate) -> Self {
        Self::new(candidate.name(), candidate.path())
    }
}

/// Capability to register fonts by logical name.
///
/// Registration is append-only: once a name is known, further calls for it are no-ops.
pub trait FontRegistry {
    /// Whether `name` has been registered.
    fn is_registered(&self, name: &str) -> bool;

    /// Registers the font at `path` under `name` unless the name is already taken.
    ///
    /// Returns `true` when the font was newly registered. Fails with
    /// [`ReportError::InvalidFontAsset`] if the file cannot be loaded as a font.
    fn register_if_absent(&self, name: &str, path: &Path) -> Result<bool>;

    /// Raw font data registered under `name`.
    fn font_bytes(&self, name: &str) -> Option<Arc<Vec<u8>>>;
}

impl<R: FontRegistry + ?Sized> FontRegistry for &R {
    fn is_registered(&self, name: &str) -> bool {
        (**self).is_registered(name)
    }

    fn register_if_absent(&self, name: &str, path: &Path) -> Result<bool> {
        (**self).register_if_absent(name, path)
    }

    fn font_bytes(&self, name: &str) -> Option<Arc<Vec<u8>>> {
        (**self).font_bytes(name)
    }
}

#[derive(Debug)]
struct RegisteredFont {
    path: PathBuf,
    data: Arc<Vec<u8>>,
}

/// Thread-safe font registry holding validated font data in memory.
#[derive(Debug, Default)]
pub struct FontCache {
    fonts: Mutex<HashMap<String, RegisteredFont>>,
}

impl FontCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Location the font registered under `name` was loaded from.
    pub fn registered_path(&self, name: &str) -> Option<PathBuf> {
        self.lock().get(name).map(|font| font.path.clone())
    }

    /// Logical names currently registered.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RegisteredFont>> {
        self.fonts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FontRegistry for FontCache {
    fn is_registered(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    fn register_if_absent(&self, name: &str, path: &Path) -> Result<bool> {
        let mut fonts = self.lock();
        if fonts.contains_key(name) {
            return Ok(false);
        }

        let data = load_font_bytes(name, path)?;
        fonts.insert(
            name.to_owned(),
            RegisteredFont {
                path: path.to_path_buf(),
                data: Arc::new(data),
            },
        );
        info!("Registered font '{}' from {}", name, path.display());
        Ok(true)
    }

    fn font_bytes(&self, name: &str) -> Option<Arc<Vec<u8>>> {
        self.lock().get(name).map(|font| Arc::clone(&font.data))
    }
}

static FONT_CACHE: OnceLock<FontCache> = OnceLock::new();

/// Returns the process-wide font cache.
pub fn global_font_cache() -> &'static FontCache {
    FONT_CACHE.get_or_init(FontCache::new)
}

/// Handle to the process-wide font cache.
///
/// Registrations made through any handle are visible to every other handle for the lifetime of
/// the process.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessFontRegistry;

impl FontRegistry for ProcessFontRegistry {
    fn is_registered(&self, name: &str) -> bool {
        global_font_cache().is_registered(name)
    }

    fn register_if_absent(&self, name: &str, path: &Path) -> Result<bool> {
        global_font_cache().register_if_absent(name, path)
    }

    fn font_bytes(&self, name: &str) -> Option<Arc<Vec<u8>>> {
        global_font_cache().font_bytes(name)
    }
}

/// Reads `path` and checks that `genpdf` can parse it as a font.
pub fn load_font_bytes(name: &str, path: &Path) -> Result<Vec<u8>> {
    let invalid = |reason: String| ReportError::InvalidFontAsset {
        name: name.to_owned(),
        path: path.to_path_buf(),
        reason,
    };

    let data = fs::read(path).map_err(|err| invalid(err.to_string()))?;
    FontData::new(data.clone(), None).map_err(|err| invalid(err.to_string()))?;
    Ok(data)
}

/// Returns the first candidate for which `probe` produces a value.
///
/// Candidates after the first hit are never probed.
pub fn first_available<T, U, I, F>(candidates: I, probe: F) -> Option<U>
where
    I: IntoIterator<Item = T>,
    F: FnMut(T) -> Option<U>,
{
    candidates.into_iter().find_map(probe)
}

/// Resolves the font used for report text from an ordered candidate list.
#[derive(Clone, Debug)]
pub struct FontResolver<R = ProcessFontRegistry> {
    candidates: Vec<FontCandidate>,
    registry: R,
}

impl FontResolver<ProcessFontRegistry> {
    /// Creates a resolver backed by the process-wide registry.
    pub fn new(candidates: Vec<FontCandidate>) -> Self {
        Self::with_registry(candidates, ProcessFontRegistry)
    }

    /// Creates a resolver using the candidates configured in `config`.
    pub fn from_config(config: &ReportConfig) -> Self {
        Self::new(config.font_candidates().to_vec())
    }
}

impl<R: FontRegistry> FontResolver<R> {
    /// Creates a resolver backed by the given registry.
    pub fn with_registry(candidates: Vec<FontCandidate>, registry: R) -> Self {
        Self {
            candidates,
            registry,
        }
    }

    /// The candidates in priority order.
    pub fn candidates(&self) -> &[FontCandidate] {
        &self.candidates
    }

    /// The registry fonts are registered with.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Returns the first candidate whose file exists and can be registered.
    ///
    /// A candidate whose file exists but cannot be loaded is skipped with a warning. `None` means
    /// no special font is available and the default family should be used.
    pub fn resolve(&self) -> Option<FontAsset> {
        let resolved = first_available(&self.candidates, |candidate| {
            if !candidate.path().exists() {
                debug!(
                    "Font candidate '{}' not found at {}",
                    candidate.name(),
                    candidate.path().display()
                );
                return None;
            }

            match self
                .registry
                .register_if_absent(candidate.name(), candidate.path())
            {
                Ok(_) => Some(FontAsset::from(candidate)),
                Err(err) => {
                    warn!("Skipping font candidate: {}", err);
                    None
                }
            }
        });

        match &resolved {
            Some(asset) => info!(
                "Using font '{}' ({})",
                asset.name(),
                asset.path().display()
            ),
            None => info!(
                "No font candidate available; falling back to {}",
                DEFAULT_FONT_NAME
            ),
        }

        resolved
    }

    /// Builds a `genpdf` font family that uses the resolved font for every style.
    ///
    /// Fails with [`ReportError::RenderingFailure`] if the font cannot be loaded.
    pub fn font_family(&self, asset: &FontAsset) -> Result<FontFamily<FontData>> {
        let data = match self.registry.font_bytes(asset.name()) {
            Some(data) => data.as_ref().clone(),
            None => fs::read(asset.path()).map_err(|err| {
                ReportError::rendering(format!(
                    "cannot read font '{}' at {}: {}",
                    asset.name(),
                    asset.path().display(),
                    err
                ))
            })?,
        };

        let regular = FontData::new(data, None).map_err(|err| ReportError::RenderingFailure {
            message: format!("font '{}' is not usable", asset.name()),
            source: Some(err),
        })?;

        Ok(FontFamily {
            bold: regular.clone(),
            italic: regular.clone(),
            bold_italic: regular.clone(),
            regular,
        })
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    config::env_value(var).map(PathBuf::from)
}

fn metric_directory_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Some(path) = env_path(config::DEFAULT_FONTS_DIR_ENV) {
        candidates.push(path);
    }

    let bundled = config::application_base_dir().join("assets/fonts");
    candidates.push(bundled);

    let manifest = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts");
    candidates.push(manifest);

    candidates.extend(SYSTEM_METRIC_DIRECTORIES.iter().map(PathBuf::from));
    candidates.dedup();
    candidates
}

fn has_metric_files(directory: &Path) -> bool {
    directory.is_dir()
        && METRIC_FONT_FILES
            .iter()
            .all(|file| directory.join(file).is_file())
}

fn windows_font_directory() -> Option<PathBuf> {
    let mut roots = Vec::new();
    #[cfg(windows)]
    {
        for var in ["WINDIR", "SystemRoot"] {
            if let Some(root) = env_path(var) {
                roots.push(root.join("Fonts"));
            }
        }
    }
    roots.push(PathBuf::from("C:/Windows/Fonts"));

    first_available(roots, |dir| {
        dir.join(WINDOWS_FONT_FILES.regular)
            .is_file()
            .then_some(dir)
    })
}

fn load_windows_font(directory: &Path, file: &str) -> Result<FontData> {
    let path = directory.join(file);
    FontData::load(&path, Some(BuiltinFont::Helvetica)).map_err(|err| {
        ReportError::RenderingFailure {
            message: format!("failed to load fallback font metrics at {}", path.display()),
            source: Some(err),
        }
    })
}

fn windows_fallback_family(directory: &Path) -> Result<FontFamily<FontData>> {
    Ok(FontFamily {
        regular: load_windows_font(directory, WINDOWS_FONT_FILES.regular)?,
        bold: load_windows_font(directory, WINDOWS_FONT_FILES.bold)?,
        italic: load_windows_font(directory, WINDOWS_FONT_FILES.italic)?,
        bold_italic: load_windows_font(directory, WINDOWS_FONT_FILES.bold_italic)?,
    })
}

/// Loads the default font family, emitted as the PDF built-in Helvetica.
///
/// `genpdf` measures text with real glyph metrics even for built-in fonts, so this looks for
/// Liberation Sans files (metric-compatible with Helvetica) in `explicit`,
/// `COMPLIANCE_REPORT_DEFAULT_FONTS_DIR`, `assets/fonts` next to the executable or the crate, and
/// the usual system locations, then falls back to the Windows Arial family.
///
/// Text rendered with this family must go through [`to_builtin_charset`] first.
pub fn default_font_family(explicit: Option<&Path>) -> Result<FontFamily<FontData>> {
    let searched = metric_directory_candidates(explicit);

    if let Some(directory) = first_available(&searched, |dir| has_metric_files(dir).then_some(dir))
    {
        debug!("Loading default font metrics from {}", directory.display());
        return fonts::from_files(directory, METRIC_FAMILY_NAME, Some(Builtin::Helvetica)).map_err(
            |err| ReportError::RenderingFailure {
                message: format!(
                    "failed to load default font family '{}' from {}",
                    METRIC_FAMILY_NAME,
                    directory.display()
                ),
                source: Some(err),
            },
        );
    }

    if let Some(directory) = windows_font_directory() {
        warn!(
            "{} metrics not found; using the Windows Arial family from {}",
            METRIC_FAMILY_NAME,
            directory.display()
        );
        return windows_fallback_family(&directory);
    }

    let checked = searched
        .iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ReportError::rendering(format!(
        "no metric files for the default font family. Checked: {}. Set {} to a directory containing {}",
        checked,
        config::DEFAULT_FONTS_DIR_ENV,
        METRIC_FONT_FILES.join(", ")
    )))
}

/// Indicates whether [`default_font_family`] can find its metric files.
pub fn default_fonts_available(explicit: Option<&Path>) -> bool {
    metric_directory_candidates(explicit)
        .iter()
        .any(|dir| has_metric_files(dir))
        || windows_font_directory().is_some()
}

fn encodable_in_builtin_font(ch: char) -> bool {
    let mut buffer = [0; 4];
    Document::encode_text(Some(BUILTIN_ENCODING), ch.encode_utf8(&mut buffer)).len() == 1
}

/// Rewrites `text` so the built-in PDF fonts can print it.
///
/// Built-in fonts only cover WinAnsiEncoding. Tabs become spaces and every other character outside
/// that encoding becomes `?`. Text that is already printable is borrowed unchanged.
pub fn to_builtin_charset(text: &str) -> Cow<'_, str> {
    if text.chars().all(encodable_in_builtin_font) {
        return Cow::Borrowed(text);
    }

    Cow::Owned(
        text.chars()
            .map(|ch| match ch {
                '\t' => ' ',
                ch if encodable_in_builtin_font(ch) => ch,
                _ => UNPRINTABLE_REPLACEMENT,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_available_stops_at_first_hit() {
        let probed = Cell::new(0);
        let hit = first_available([1, 2, 3, 4], |value| {
            probed.set(probed.get() + 1);
            (value % 2 == 0).then_some(value * 10)
        });
        assert_eq!(hit, Some(20));
        assert_eq!(probed.get(), 2);
    }

    #[test]
    fn first_available_on_empty_list_is_none() {
        let hit: Option<u8> = first_available(Vec::<u8>::new(), Some);
        assert_eq!(hit, None);
    }

    #[test]
    fn cache_rejects_files_that_are_not_fonts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.ttf");
        fs::write(&path, b"not a font").expect("write");

        let cache = FontCache::new();
        let err = cache.register_if_absent("Broken", &path).unwrap_err();
        assert!(matches!(err, ReportError::InvalidFontAsset { .. }));
        assert!(!cache.is_registered("Broken"));
    }

    #[test]
    fn cache_rejects_missing_files() {
        let cache = FontCache::new();
        let err = cache
            .register_if_absent("Missing", Path::new("/__compliance_report_missing__.ttf"))
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidFontAsset { .. }));
    }

    #[test]
    fn font_family_for_unusable_font_is_a_rendering_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("garbage.ttf");
        fs::write(&path, b"garbage").expect("write");

        let resolver = FontResolver::with_registry(Vec::new(), FontCache::new());
        let err = resolver
            .font_family(&FontAsset::new("Garbage", &path))
            .unwrap_err();
        assert!(matches!(err, ReportError::RenderingFailure { .. }));
    }

    #[test]
    fn windows_fallback_family_loads_as_builtin_helvetica() {
        let Some(installed) = [
            "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "C:/Windows/Fonts/arial.ttf",
        ]
        .into_iter()
        .map(Path::new)
        .find(|path| path.is_file()) else {
            eprintln!("Skipping windows_fallback_family_loads_as_builtin_helvetica: no font installed");
            return;
        };

        let dir = tempfile::tempdir().expect("tempdir");
        for file in [
            WINDOWS_FONT_FILES.regular,
            WINDOWS_FONT_FILES.bold,
            WINDOWS_FONT_FILES.italic,
            WINDOWS_FONT_FILES.bold_italic,
        ] {
            fs::copy(installed, dir.path().join(file)).expect("copy font");
        }

        assert!(windows_fallback_family(dir.path()).is_ok());
    }

    #[test]
    fn builtin_charset_keeps_winansi_text_borrowed() {
        let text = "Caf\u{e9} \u{2013} 2.4m & <ok> \"q\" \u{20ac}";
        assert!(matches!(to_builtin_charset(text), Cow::Borrowed(_)));
    }

    #[test]
    fn builtin_charset_replaces_hangul() {
        assert_eq!(
            to_builtin_charset("\u{cc38}\u{ace0} \u{bc95}\u{b839}: 1"),
            "?? ??: 1"
        );
        assert_eq!(to_builtin_charset("\u{b3c4}\u{ba74}.png"), "??.png");
    }

    #[test]
    fn builtin_charset_turns_tabs_into_spaces() {
        assert_eq!(to_builtin_charset("a\tb"), "a b");
    }

    #[test]
    fn builtin_charset_replaces_control_characters() {
        assert_eq!(to_builtin_charset("a\u{0}b\u{7}c\rd"), "a?b?c?d");
        assert_eq!(to_builtin_charset("\u{1f600}"), "?");
    }
}
