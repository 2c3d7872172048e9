//! Place a stamp image onto one page of the source document.
//!
//! The stamp becomes an RGB image XObject registered in the page's own
//! resource dictionary. Its draw call is appended after the page's existing
//! content, which is wrapped in `q … Q` so a graphics state left dirty by
//! the original content cannot move or clip the stamp.
//!
//! Placement uses a top-left origin in PDF points, like a screen: `(x, y)`
//! is the distance from the page's left and top edges to the stamp's
//! top-left corner. The rendered height follows the image's aspect ratio.

use crate::config::StampPlacement;
use crate::pipeline::document::SourceDocument;
use crate::pipeline::stamp::StampArtifact;
use image::ImageFormat;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use thiserror::Error;
use tracing::debug;

/// US Letter, used when no MediaBox can be found on the page or its parents.
const FALLBACK_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Parent-chain depth limit when looking up inherited page attributes.
const MAX_TREE_DEPTH: usize = 64;

/// Why a stamp could not be placed.
#[derive(Debug, Error)]
pub enum AnnotateError {
    #[error("page index {index} out of range (document has {total} pages)")]
    PageOutOfRange { index: usize, total: usize },

    #[error("stamp image could not be decoded: {0}")]
    Image(String),

    #[error("page structure rejected: {0}")]
    Pdf(#[from] lopdf::Error),
}

/// Where a stamp ended up, in PDF user space (bottom-left origin).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StampRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Stamp `artifact` onto the page at 0-based `page_index`.
pub fn stamp_page(
    source: &mut SourceDocument,
    page_index: usize,
    artifact: &StampArtifact,
    placement: &StampPlacement,
) -> Result<StampRect, AnnotateError> {
    let page_id = source
        .page_id(page_index)
        .ok_or(AnnotateError::PageOutOfRange {
            index: page_index,
            total: source.page_count(),
        })?;
    let doc = source.document_mut();

    let rgb = image::load_from_memory_with_format(&artifact.png, ImageFormat::Png)
        .map_err(|e| AnnotateError::Image(e.to_string()))?
        .to_rgb8();
    let (px_w, px_h) = rgb.dimensions();

    let mut image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(i64::from(px_w)),
            "Height" => Object::Integer(i64::from(px_h)),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
        },
        rgb.into_raw(),
    );
    // Uncompressed RGB is ~2 MB per stamp; a failed deflate just stays raw.
    let _ = image.compress();
    let image_id = doc.add_object(image);
    let name = format!("GsStamp{}", image_id.0);

    let media_box = media_box(doc, page_id)?;
    let rect = place(&media_box, placement, artifact.aspect_ratio());

    register_xobject(doc, page_id, &name, image_id)?;
    append_draw_call(doc, page_id, &name, &rect)?;

    debug!(
        "Stamped page {} with /{} at ({:.1}, {:.1}) {:.1}×{:.1} pt",
        page_index + 1,
        name,
        rect.x,
        rect.y,
        rect.width,
        rect.height
    );
    Ok(rect)
}

/// Convert a top-left placement into a PDF-space rectangle on `media_box`.
fn place(media_box: &[f32; 4], placement: &StampPlacement, aspect: f32) -> StampRect {
    let [left, _, _, top] = *media_box;
    let width = placement.max_width;
    let height = width * aspect;
    StampRect {
        x: left + placement.x,
        y: top - placement.y - height,
        width,
        height,
    }
}

/// Give the page its own resource dictionary containing the stamp.
///
/// Shared or inherited resources are copied rather than edited, so the
/// stamp of one page never becomes reachable from another and is pruned
/// away when that page is split out.
fn register_xobject(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    image_id: ObjectId,
) -> Result<(), AnnotateError> {
    let current = match doc.get_dictionary(page_id)?.get(b"Resources") {
        Ok(obj) => Some(obj.clone()),
        Err(_) => inherited(doc, page_id, b"Resources")?,
    };
    let mut resources = match current {
        Some(Object::Reference(id)) => doc.get_dictionary(id)?.clone(),
        Some(Object::Dictionary(dict)) => dict,
        _ => Dictionary::new(),
    };
    let mut xobjects = match resources.get(b"XObject") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id)?.clone(),
        Ok(Object::Dictionary(dict)) => dict.clone(),
        _ => Dictionary::new(),
    };

    xobjects.set(name, Object::Reference(image_id));
    resources.set("XObject", xobjects);
    doc.get_dictionary_mut(page_id)?.set("Resources", resources);
    Ok(())
}

/// Rewrite `/Contents` as `[q, existing…, Q + stamp]`.
fn append_draw_call(
    doc: &mut Document,
    page_id: ObjectId,
    name: &str,
    rect: &StampRect,
) -> Result<(), AnnotateError> {
    let existing: Vec<Object> = match doc.get_dictionary(page_id)?.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id)? {
            Object::Array(items) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let ops = format!(
        "Q\nq\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
        rect.width, rect.height, rect.x, rect.y, name
    );
    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(dictionary! {}, ops.into_bytes()));

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(stamp_id));

    doc.get_dictionary_mut(page_id)?
        .set("Contents", Object::Array(contents));
    Ok(())
}

/// The page's MediaBox, following `/Parent` when it is inherited.
fn media_box(doc: &Document, page_id: ObjectId) -> Result<[f32; 4], AnnotateError> {
    let raw = match doc.get_dictionary(page_id)?.get(b"MediaBox") {
        Ok(obj) => Some(obj.clone()),
        Err(_) => inherited(doc, page_id, b"MediaBox")?,
    };
    let array = match raw {
        Some(Object::Reference(id)) => doc.get_object(id)?.as_array()?.clone(),
        Some(Object::Array(items)) => items,
        _ => return Ok(FALLBACK_MEDIA_BOX),
    };
    if array.len() != 4 {
        return Ok(FALLBACK_MEDIA_BOX);
    }

    let mut corners = [0f32; 4];
    for (slot, value) in corners.iter_mut().zip(&array) {
        *slot = value.as_float()?;
    }
    // Normalise so [0] ≤ [2] and [1] ≤ [3].
    Ok([
        corners[0].min(corners[2]),
        corners[1].min(corners[3]),
        corners[0].max(corners[2]),
        corners[1].max(corners[3]),
    ])
}

/// Look up an inheritable page attribute on the page's ancestors.
fn inherited(doc: &Document, page_id: ObjectId, key: &[u8]) -> Result<Option<Object>, AnnotateError> {
    let mut parent = doc
        .get_dictionary(page_id)?
        .get(b"Parent")
        .and_then(Object::as_reference)
        .ok();

    for _ in 0..MAX_TREE_DEPTH {
        let Some(node_id) = parent else { break };
        let node = doc.get_dictionary(node_id)?;
        if let Ok(value) = node.get(key) {
            return Ok(Some(value.clone()));
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::document::fixtures::sample_document;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn artifact(width: u32, height: u32) -> StampArtifact {
        let img = RgbImage::from_pixel(width, height, image::Rgb([255, 165, 0]));
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        StampArtifact { png, width, height }
    }

    fn image_xobjects(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
        let page = doc.get_dictionary(page_id).unwrap();
        let Ok(resources) = page.get(b"Resources").and_then(Object::as_dict) else {
            return Vec::new();
        };
        let Ok(xobjects) = resources.get(b"XObject").and_then(Object::as_dict) else {
            return Vec::new();
        };
        xobjects
            .iter()
            .filter_map(|(_, v)| v.as_reference().ok())
            .filter(|id| match doc.get_object(*id) {
                Ok(Object::Stream(s)) => {
                    matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image")
                }
                _ => false,
            })
            .collect()
    }

    #[test]
    fn placement_converts_top_left_to_pdf_space() {
        let placement = StampPlacement {
            x: 400.0,
            y: 100.0,
            max_width: 200.0,
        };
        let rect = place(&[0.0, 0.0, 595.0, 842.0], &placement, 0.75);
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 150.0);
        assert_eq!(rect.x, 400.0);
        assert_eq!(rect.y, 842.0 - 100.0 - 150.0);
    }

    #[test]
    fn placement_respects_offset_media_box() {
        let placement = StampPlacement {
            x: 10.0,
            y: 20.0,
            max_width: 100.0,
        };
        let rect = place(&[50.0, 60.0, 650.0, 860.0], &placement, 0.5);
        assert_eq!(rect.x, 60.0);
        assert_eq!(rect.y, 860.0 - 20.0 - 50.0);
    }

    #[test]
    fn stamp_adds_image_to_target_page_only() {
        let mut src = SourceDocument::from_document(sample_document(3), "mem.pdf");
        let rect = stamp_page(&mut src, 1, &artifact(64, 48), &StampPlacement::default()).unwrap();
        assert_eq!(rect.width, 200.0);
        assert_eq!(rect.height, 150.0);

        let doc = src.document();
        let stamped = src.page_id(1).unwrap();
        let images = image_xobjects(doc, stamped);
        assert_eq!(images.len(), 1);
        match doc.get_object(images[0]).unwrap() {
            Object::Stream(s) => {
                assert_eq!(s.dict.get(b"Width").unwrap().as_i64().unwrap(), 64);
                assert_eq!(s.dict.get(b"Height").unwrap().as_i64().unwrap(), 48);
            }
            other => panic!("expected stream, got {other:?}"),
        }

        // Neighbouring pages still inherit the untouched shared resources.
        for other in [0, 2] {
            assert!(image_xobjects(doc, src.page_id(other).unwrap()).is_empty());
        }
    }

    #[test]
    fn existing_content_is_wrapped() {
        let mut src = SourceDocument::from_document(sample_document(1), "mem.pdf");
        stamp_page(&mut src, 0, &artifact(8, 6), &StampPlacement::default()).unwrap();

        let page = src.document().get_dictionary(src.page_id(0).unwrap()).unwrap();
        let contents = page.get(b"Contents").unwrap().as_array().unwrap();
        assert_eq!(contents.len(), 3);

        let last_id = contents[2].as_reference().unwrap();
        let Object::Stream(last) = src.document().get_object(last_id).unwrap() else {
            panic!("draw call is not a stream");
        };
        let ops = String::from_utf8_lossy(&last.content);
        assert!(ops.starts_with("Q\n"), "got: {ops}");
        assert!(ops.contains(" Do"), "got: {ops}");
    }

    #[test]
    fn font_resources_survive_stamping() {
        let mut src = SourceDocument::from_document(sample_document(1), "mem.pdf");
        stamp_page(&mut src, 0, &artifact(8, 6), &StampPlacement::default()).unwrap();

        let page = src.document().get_dictionary(src.page_id(0).unwrap()).unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        assert!(resources.get(b"Font").is_ok());
    }

    #[test]
    fn two_stamps_on_one_page_get_distinct_names() {
        let mut src = SourceDocument::from_document(sample_document(1), "mem.pdf");
        stamp_page(&mut src, 0, &artifact(8, 6), &StampPlacement::default()).unwrap();
        stamp_page(&mut src, 0, &artifact(8, 6), &StampPlacement::default()).unwrap();
        assert_eq!(image_xobjects(src.document(), src.page_id(0).unwrap()).len(), 2);
    }

    #[test]
    fn out_of_range_page_is_rejected() {
        let mut src = SourceDocument::from_document(sample_document(2), "mem.pdf");
        let err = stamp_page(&mut src, 5, &artifact(8, 6), &StampPlacement::default()).unwrap_err();
        assert!(matches!(
            err,
            AnnotateError::PageOutOfRange { index: 5, total: 2 }
        ));
    }

    #[test]
    fn undecodable_artifact_is_rejected() {
        let mut src = SourceDocument::from_document(sample_document(1), "mem.pdf");
        let bogus = StampArtifact {
            png: b"not a png".to_vec(),
            width: 4,
            height: 3,
        };
        let err = stamp_page(&mut src, 0, &bogus, &StampPlacement::default()).unwrap_err();
        assert!(matches!(err, AnnotateError::Image(_)));
    }
}
