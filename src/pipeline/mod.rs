//! Pipeline stages for masterplan analysis.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and a backend can be swapped without touching the
//! others.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ normalize ──▶ llm ──▶ validate ──▶ aggregate
//! (path/URL)  (render+encode  (VLM)  (schema     (sort, sum)
//!              or pass-through)       check)
//! ```
//!
//! 1. [`input`]     — read a local file or download a URL, enforcing the
//!    upload type and size limits
//! 2. [`normalize`] — PDF page 1 → JPEG via [`render`] and [`encode`];
//!    images pass through untouched
//! 3. [`llm`]       — one VLM call per analysis through the [`llm::VisionModel`]
//!    seam ([`gemini`] or any edgequake-llm provider)
//! 4. [`validate`]  — parse the reply and drop malformed entries
//! 5. [`aggregate`] — display ordering and the total share

pub mod aggregate;
pub mod encode;
pub mod gemini;
pub mod input;
pub mod llm;
pub mod normalize;
pub mod render;
pub mod validate;
