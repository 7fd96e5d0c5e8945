//! Internal constants for diagram handling.

/// Font settings injected into every diagram that does not set its own.
pub const SKINPARAMS: &str = "skinparam defaultFontSize 11\n\
skinparam defaultFontName Arial\n\
skinparam ArrowFontSize 10\n\
skinparam ClassFontSize 11\n\
skinparam NoteFontSize 10\n";

/// Marker used to detect diagrams that already carry font settings.
pub const SKINPARAM_MARKER: &str = "skinparam defaultFontSize";

/// Default public prefix for diagram image links.
pub const DEFAULT_PUBLIC_URL: &str = "/plantuml";
