//! Pipeline stages for grade stamping.
//!
//! Each submodule implements one step; [`crate::batch`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! roster ──▶ stats ──▶ stamp ──▶ annotate ──▶ (working file) ──▶ split ──▶ paths
//!  (CSV)   (quartiles)  (PNG)     (lopdf)                        (lopdf)  (naming)
//! ```
//!
//! 1. [`roster`]   — load the `;`-separated roster into a validated [`roster::Dataset`]
//! 2. [`stats`]    — class quartiles, whiskers and the colour classification
//! 3. [`stamp`]    — draw one record's box-plot stamp and encode it as PNG
//! 4. [`input`]    — check the source path really is a PDF
//! 5. [`document`] — own the source document, save and reload its working copy
//! 6. [`annotate`] — embed a stamp as an image XObject on a page
//! 7. [`split`]    — extract a record's page range into its own file
//! 8. [`paths`]    — `<dest>/<id>/<date>_<id>_<title>.pdf`

pub mod annotate;
pub mod document;
pub mod input;
pub mod paths;
pub mod roster;
pub mod split;
pub mod stamp;
pub mod stats;
