use image::RgbImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

const IMAGE_NAME: &str = "Im0";

/// Wraps a raster as the only page of a PDF whose page box matches the raster
/// size one pixel per point
pub fn single_page_pdf(raster: &RgbImage) -> Result<Vec<u8>, lopdf::Error> {
    let width = raster.width() as i64;
    let height = raster.height() as i64;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut image_stream = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => Object::Integer(width),
            "Height" => Object::Integer(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => Object::Integer(8),
        },
        raster.as_raw().clone(),
    );
    // Falls back to an uncompressed stream, which is still valid
    let _ = image_stream.compress();
    let image_id = doc.add_object(image_stream);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(width),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(height),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content.encode()?));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "MediaBox" => vec![
            Object::Integer(0),
            Object::Integer(0),
            Object::Integer(width),
            Object::Integer(height),
        ],
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_NAME => image_id,
            },
        },
    });

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => Object::Integer(1),
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)?;

    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_single_page_matches_raster_size() {
        let raster = RgbImage::from_pixel(400, 250, Rgb([21, 128, 61]));
        let bytes = single_page_pdf(&raster).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));

        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);

        let page_id = *pages.values().next().unwrap();
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let media_box: Vec<i64> = page
            .get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_i64().unwrap())
            .collect();

        assert_eq!(media_box, vec![0, 0, 400, 250]);
    }

    #[test]
    fn test_output_is_deterministic() {
        let raster = RgbImage::from_pixel(40, 25, Rgb([1, 2, 3]));
        assert_eq!(
            single_page_pdf(&raster).unwrap(),
            single_page_pdf(&raster).unwrap()
        );
    }
}
