//! Localized user-facing text
//!
//! Error descriptions, severity labels and metric names are looked up in the
//! `locales/` catalogs. Supported languages: Japanese (ja) and English (en).
//!
//! # Environment Variables
//!
//! - `SEIKYOKU_LANG`: Preferred language (ja, en). The CLI defaults to
//!   Japanese; library users get English until a locale is set.
//!
//! # Usage
//!
//! ```rust,ignore
//! use seikyoku::i18n::{set_locale, t};
//!
//! set_locale("ja");
//! let label = t!("severity.high");
//! ```

// The rust_i18n::i18n! macro is declared in lib.rs (crate root)

/// Environment variable selecting the locale
pub const LANG_ENV: &str = "SEIKYOKU_LANG";

/// Locale used by the CLI when `SEIKYOKU_LANG` is unset
pub const DEFAULT_LOCALE: &str = "ja";

/// Set the process-wide locale for translations
///
/// # Arguments
///
/// * `locale` - Language code (ja, en), in any common spelling
pub fn set_locale(locale: &str) {
    let normalized = normalize_locale(locale);
    rust_i18n::set_locale(normalized);
}

/// Currently active locale
pub fn current_locale() -> String {
    String::from(&*rust_i18n::locale())
}

/// Initialize the locale from `SEIKYOKU_LANG`, defaulting to Japanese
pub fn init_from_env() {
    let locale = std::env::var(LANG_ENV).unwrap_or_else(|_| DEFAULT_LOCALE.to_string());
    set_locale(&locale);
    tracing::debug!(locale = %current_locale(), "Locale initialized");
}

/// Normalize a locale code to a supported one
///
/// - ja-JP, ja_JP, japanese -> ja
/// - anything else -> en
fn normalize_locale(locale: &str) -> &'static str {
    let lower = locale.trim().to_lowercase();

    if lower.starts_with("ja") || lower == "jp" {
        "ja"
    } else {
        "en"
    }
}

/// Translate a key with optional named arguments
///
/// Re-export of `rust_i18n::t!`.
///
/// ```rust,ignore
/// let msg = t!("errors.monitor.stop_timeout", waited_ms = 5000);
/// let ja = t!("errors.source.timeout", locale = "ja");
/// ```
#[doc(inline)]
pub use rust_i18n::t;
