//! Site implementations.
//!
//! Every site is a [`SiteEngine`] driven by a [`SiteConfig`] record. The
//! records of the supported sites are embedded in the library behind the
//! `builtin-sites` feature (enabled by default):
//!
//! - `lanhlungteam` - Lạnh Lùng Team
//! - `manhwax10` - ManhwaX10
//! - `mehentai` - MeHentai
//! - `thienthaitruyen` - Thiên Thai Truyện
//! - `truyenhentaiz` - TruyenHentaiZ
//! - `kuroneko` - Kuro Neko / vi-Hentai
//! - `hentaivnworld` - HentaiVN.world
//! - `mimihentai` - MimiHentai (JSON API)
//!
//! Build without them:
//! ```bash
//! cargo build --no-default-features
//! ```
//!
//! Other sites are added by loading a TOML record with
//! [`SiteConfig::load`] and wrapping it in a [`SiteEngine`].

mod engine;

pub use engine::SiteEngine;

#[cfg(feature = "builtin-sites")]
use crate::{config::SiteConfig, error::Result};

#[cfg(feature = "builtin-sites")]
const BUILTIN: &[(&str, &str)] = &[
    ("lanhlungteam", include_str!("sites/lanhlungteam.toml")),
    ("manhwax10", include_str!("sites/manhwax10.toml")),
    ("mehentai", include_str!("sites/mehentai.toml")),
    ("thienthaitruyen", include_str!("sites/thienthaitruyen.toml")),
    ("truyenhentaiz", include_str!("sites/truyenhentaiz.toml")),
    ("kuroneko", include_str!("sites/kuroneko.toml")),
    ("hentaivnworld", include_str!("sites/hentaivnworld.toml")),
    ("mimihentai", include_str!("sites/mimihentai.toml")),
];

/// Ids of the embedded site records.
#[cfg(feature = "builtin-sites")]
pub fn builtin_ids() -> Vec<&'static str> {
    BUILTIN.iter().map(|(id, _)| *id).collect()
}

/// Parses every embedded site record.
#[cfg(feature = "builtin-sites")]
pub fn builtin() -> Result<Vec<SiteConfig>> {
    BUILTIN
        .iter()
        .map(|(_, text)| SiteConfig::from_toml_str(text))
        .collect()
}

/// Parses one embedded site record.
#[cfg(feature = "builtin-sites")]
pub fn builtin_config(id: &str) -> Option<Result<SiteConfig>> {
    BUILTIN
        .iter()
        .find(|(builtin_id, _)| *builtin_id == id)
        .map(|(_, text)| SiteConfig::from_toml_str(text))
}
