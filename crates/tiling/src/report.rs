use crate::{
    aggregate::AggregatedResult,
    error::{Result, TilingError},
};
use ab_glyph::{Font, FontRef};
use common::span;
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use lopdf::{
    Document, Object, ObjectId, Stream, StringFormat,
    content::{Content, Operation},
    dictionary,
};
use std::{
    cmp::Ordering,
    collections::BTreeMap,
    iter::Peekable,
    path::{Path, PathBuf},
    str::Chars,
};

/// Raster types picked up from a visualization directory.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

// A4 landscape, in points.
const PAGE_WIDTH: i64 = 842;
const PAGE_HEIGHT: i64 = 595;
const MARGIN: i64 = 36;
const MAX_IMAGE_HEIGHT: i64 = 360;
const FONT_SIZE: i64 = 11;
const LINE_HEIGHT: i64 = 14;
const JPEG_QUALITY: u8 = 85;
// Well under the 65535 px JPEG limit on either side.
const MAX_EMBEDDED_SIDE: u32 = 16_384;

static FONT_DATA: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");
const FONT_NAME: &str = "DejaVuSans";

/// Compare strings with digit runs ordered by value: `c2` < `c10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let ord = compare_numeric(&take_digits(&mut left), &take_digits(&mut right));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(l), Some(r)) => {
                if l != r {
                    return l.cmp(&r);
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Raster files in `dir`, naturally sorted by file name.
pub fn collect_visualizations(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_allowed_extension(&path) {
            paths.push(path);
        }
    }

    paths.sort_by(|a, b| {
        let a = a.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        let b = b.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
        natural_cmp(&a, &b)
    });
    Ok(paths)
}

/// Tile visualization files keyed by grid position.
///
/// Iteration is row-major, the same order a natural sort of
/// `{stem}_r{row}_c{col}` names gives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileArtifacts {
    paths: BTreeMap<(u32, u32), PathBuf>,
}

impl TileArtifacts {
    pub fn insert(&mut self, row: u32, col: u32, path: PathBuf) {
        self.paths.insert((row, col), path);
    }

    pub fn get(&self, row: u32, col: u32) -> Option<&Path> {
        self.paths.get(&(row, col)).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn ordered_paths(&self) -> Vec<PathBuf> {
        self.paths.values().cloned().collect()
    }

    /// Delete every recorded file. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        remove_files(self.paths.values())
    }
}

/// Best-effort delete; failures are logged and skipped.
pub fn remove_files<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) -> usize {
    let mut removed = 0;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
        }
    }
    removed
}

/// Place `images` left to right on a black canvas as tall as the tallest one.
pub fn merge_horizontal(images: &[RgbImage]) -> Result<RgbImage> {
    if images.is_empty() {
        return Err(TilingError::NoImagesToMerge);
    }

    let width: u32 = images.iter().map(RgbImage::width).sum();
    let height = images.iter().map(RgbImage::height).max().unwrap_or(0);
    let mut canvas = RgbImage::new(width, height);

    let mut x = 0i64;
    for image in images {
        image::imageops::replace(&mut canvas, image, x, 0);
        x += image.width() as i64;
    }
    Ok(canvas)
}

/// Size the composite is shrunk to before embedding, if it is too large on either side.
fn embedded_size(width: u32, height: u32) -> Option<(u32, u32)> {
    if width <= MAX_EMBEDDED_SIDE && height <= MAX_EMBEDDED_SIDE {
        return None;
    }
    let scale = (MAX_EMBEDDED_SIDE as f64 / width as f64).min(MAX_EMBEDDED_SIDE as f64 / height as f64);
    let fit = |side: u32| ((side as f64 * scale).round() as u32).clamp(1, MAX_EMBEDDED_SIDE);
    Some((fit(width), fit(height)))
}

/// PDF with the composite on the first page, then one `class: confidence` line per detection.
pub fn render_pdf(composite: &RgbImage, result: &AggregatedResult) -> Result<Vec<u8>> {
    let embedded = match embedded_size(composite.width(), composite.height()) {
        Some((width, height)) => image::imageops::thumbnail(composite, width, height),
        None => composite.clone(),
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&embedded)?;

    let (draw_width, draw_height) = fit_on_page(embedded.width(), embedded.height());
    let lines: Vec<String> = std::iter::once(format!("Detections: {}", result.detected_count))
        .chain(
            result
                .listing()
                .map(|(class, confidence)| format!("{class}: {confidence:.2}")),
        )
        .collect();
    let mut glyphs = GlyphText::new()?;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.new_object_id();
    let image_id = doc.add_object(
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => embedded.width() as i64,
                "Height" => embedded.height() as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => int(8),
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false),
    );
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
        "XObject" => dictionary! { "Im1" => image_id },
    });

    let image_top = PAGE_HEIGHT - MARGIN;
    let first_page = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                int(draw_width),
                int(0),
                int(0),
                int(draw_height),
                int(MARGIN),
                int(image_top - draw_height),
            ],
        ),
        Operation::new("Do", vec!["Im1".into()]),
        Operation::new("Q", vec![]),
    ];

    let mut pages = vec![first_page];
    let mut y = image_top - draw_height - 2 * LINE_HEIGHT;
    for line in &lines {
        if y < MARGIN {
            pages.push(Vec::new());
            y = PAGE_HEIGHT - MARGIN - LINE_HEIGHT;
        }
        if let Some(page) = pages.last_mut() {
            page.extend(text_line(glyphs.encode(line), MARGIN, y));
        }
        y -= LINE_HEIGHT;
    }

    let mut kids = Vec::with_capacity(pages.len());
    for operations in pages {
        let content = Content { operations }.encode().map_err(report_error)?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(Object::Reference(page_id));
    }

    glyphs.add_font(&mut doc, font_id)?;

    let page_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![int(0), int(0), int(PAGE_WIDTH), int(PAGE_HEIGHT)],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(lopdf::Error::from).map_err(report_error)?;
    Ok(bytes)
}

fn int(value: i64) -> Object {
    Object::Integer(value)
}

fn report_error(e: lopdf::Error) -> TilingError {
    TilingError::Report(e.to_string())
}

fn text_line(glyph_codes: Vec<u8>, x: i64, y: i64) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), int(FONT_SIZE)]),
        Operation::new("Td", vec![int(x), int(y)]),
        Operation::new(
            "Tj",
            vec![Object::String(glyph_codes, StringFormat::Hexadecimal)],
        ),
        Operation::new("ET", vec![]),
    ]
}

/// Text set in the embedded TrueType font.
///
/// Strings are written as two-byte glyph ids (`Identity-H`); every id used is recorded
/// so the font gets matching widths and a `ToUnicode` map for copy and search.
struct GlyphText {
    font: FontRef<'static>,
    used: BTreeMap<u16, char>,
}

impl GlyphText {
    fn new() -> Result<Self> {
        let font = FontRef::try_from_slice(FONT_DATA)
            .map_err(|e| TilingError::Report(format!("embedded font: {e}")))?;
        Ok(Self {
            font,
            used: BTreeMap::new(),
        })
    }

    fn encode(&mut self, text: &str) -> Vec<u8> {
        let mut codes = Vec::with_capacity(text.len() * 2);
        for c in text.chars() {
            let id = self.font.glyph_id(c).0;
            // 0 is .notdef
            if id != 0 {
                self.used.entry(id).or_insert(c);
            }
            codes.extend_from_slice(&id.to_be_bytes());
        }
        codes
    }

    fn units(&self, value: f32) -> i64 {
        let units_per_em = self.font.units_per_em().unwrap_or(1000.0);
        (value * 1000.0 / units_per_em).round() as i64
    }

    fn widths(&self) -> Vec<Object> {
        let mut widths = Vec::with_capacity(self.used.len() * 2);
        for &id in self.used.keys() {
            let advance = self.font.h_advance_unscaled(ab_glyph::GlyphId(id));
            widths.push(int(id as i64));
            widths.push(Object::Array(vec![int(self.units(advance))]));
        }
        widths
    }

    fn to_unicode_cmap(&self) -> Vec<u8> {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo <<\n/Registry (Adobe)\n/Ordering (UCS)\n/Supplement 0\n>> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );

        let entries: Vec<(&u16, &char)> = self.used.iter().collect();
        for chunk in entries.chunks(100) {
            cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
            for (id, c) in chunk {
                let mut buf = [0u16; 2];
                let target: String = c
                    .encode_utf16(&mut buf)
                    .iter()
                    .map(|unit| format!("{unit:04X}"))
                    .collect();
                cmap.push_str(&format!("<{id:04X}> <{target}>\n"));
            }
            cmap.push_str("endbfchar\n");
        }

        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap.into_bytes()
    }

    /// Write the Type0 font and its parts, with the Type0 dictionary at `font_id`.
    fn add_font(self, doc: &mut Document, font_id: ObjectId) -> Result<()> {
        let mut font_file = Stream::new(
            dictionary! { "Length1" => FONT_DATA.len() as i64 },
            FONT_DATA.to_vec(),
        );
        font_file.compress().map_err(report_error)?;
        let font_file_id = doc.add_object(font_file);

        let ascent = self.units(self.font.ascent_unscaled());
        let descent = self.units(self.font.descent_unscaled());
        let descriptor_id = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => FONT_NAME,
            // Nonsymbolic
            "Flags" => int(32),
            "FontBBox" => vec![int(0), int(descent), int(1000), int(ascent)],
            "ItalicAngle" => int(0),
            "Ascent" => int(ascent),
            "Descent" => int(descent),
            "CapHeight" => int(ascent),
            "StemV" => int(80),
            "FontFile2" => font_file_id,
        });

        let cid_font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => FONT_NAME,
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => int(0),
            },
            "FontDescriptor" => descriptor_id,
            "CIDToGIDMap" => "Identity",
            "DW" => int(1000),
            "W" => self.widths(),
        });
        let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, self.to_unicode_cmap()));

        doc.objects.insert(
            font_id,
            Object::Dictionary(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type0",
                "BaseFont" => FONT_NAME,
                "Encoding" => "Identity-H",
                "DescendantFonts" => vec![Object::Reference(cid_font_id)],
                "ToUnicode" => to_unicode_id,
            }),
        );
        Ok(())
    }
}

/// Scale to the printable width, then shrink further if it would be too tall.
fn fit_on_page(width: u32, height: u32) -> (i64, i64) {
    let max_width = PAGE_WIDTH - 2 * MARGIN;
    let (width, height) = (width.max(1) as i64, height.max(1) as i64);

    let mut draw_width = max_width;
    let mut draw_height = height * max_width / width;
    if draw_height > MAX_IMAGE_HEIGHT {
        draw_width = width * MAX_IMAGE_HEIGHT / height;
        draw_height = MAX_IMAGE_HEIGHT;
    }
    (draw_width.max(1), draw_height.max(1))
}

/// Composite raster plus the rendered document, ready for upload.
#[derive(Debug, Clone)]
pub struct Report {
    pub merged_image: RgbImage,
    pub document: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReportAssembler;

impl ReportAssembler {
    /// Build a report from visualization files, merged in the order given.
    #[tracing::instrument(skip_all, fields(images = paths.len(), detections = result.detected_count))]
    pub fn assemble(&self, paths: &[PathBuf], result: &AggregatedResult) -> Result<Report> {
        let _s = span!("assemble_report");

        let images = paths
            .iter()
            .map(|path| Ok(image::open(path)?.to_rgb8()))
            .collect::<Result<Vec<_>>>()?;
        let merged_image = merge_horizontal(&images)?;
        let document = render_pdf(&merged_image, result)?;

        tracing::debug!(
            width = merged_image.width(),
            height = merged_image.height(),
            bytes = document.len(),
            "Report assembled"
        );

        Ok(Report {
            merged_image,
            document,
        })
    }

    pub fn assemble_artifacts(
        &self,
        artifacts: &TileArtifacts,
        result: &AggregatedResult,
    ) -> Result<Report> {
        self.assemble(&artifacts.ordered_paths(), result)
    }

    /// Same as [`assemble`](Self::assemble) with files discovered in `dir`.
    pub fn assemble_from_dir(&self, dir: &Path, result: &AggregatedResult) -> Result<Report> {
        self.assemble(&collect_visualizations(dir)?, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::GlobalDetection;
    use image::Rgb;

    #[test]
    fn test_natural_cmp_orders_numbers_by_value() {
        let mut names = vec!["img_r0_c10.png", "img_r0_c2.png", "img_r0_c1.png", "img_r1_c0.png"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(
            names,
            vec!["img_r0_c1.png", "img_r0_c2.png", "img_r0_c10.png", "img_r1_c0.png"]
        );
    }

    #[test]
    fn test_natural_cmp_edge_cases() {
        assert_eq!(natural_cmp("a", "a"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "ab"), Ordering::Less);
        assert_eq!(natural_cmp("x007", "x7"), Ordering::Equal);
        assert_eq!(natural_cmp("x9", "x010y"), Ordering::Less);
    }

    #[test]
    fn test_merge_horizontal_layout() {
        let red = RgbImage::from_pixel(3, 2, Rgb([255, 0, 0]));
        let blue = RgbImage::from_pixel(2, 4, Rgb([0, 0, 255]));

        let merged = merge_horizontal(&[red, blue]).unwrap();

        assert_eq!(merged.dimensions(), (5, 4));
        assert_eq!(*merged.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*merged.get_pixel(0, 3), Rgb([0, 0, 0]));
        assert_eq!(*merged.get_pixel(4, 3), Rgb([0, 0, 255]));
    }

    #[test]
    fn test_merge_nothing_fails() {
        assert!(matches!(
            merge_horizontal(&[]),
            Err(TilingError::NoImagesToMerge)
        ));
    }

    #[test]
    fn test_fit_on_page() {
        // Wide strip: limited by width
        assert_eq!(fit_on_page(2800, 100), (770, 27));
        // Tall image: limited by height
        assert_eq!(fit_on_page(100, 1000), (36, 360));
    }

    #[test]
    fn test_render_pdf_is_parseable() {
        let composite = RgbImage::from_pixel(40, 10, Rgb([10, 200, 30]));
        let result: AggregatedResult = (0..3)
            .map(|i| GlobalDetection {
                class_id: i,
                class_name: format!("class_{i}"),
                confidence: 0.5,
                bbox: [0.0; 4],
                polygon: Vec::new(),
            })
            .collect();

        let bytes = render_pdf(&composite, &result).unwrap();

        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_embedded_size_limits_both_sides() {
        assert_eq!(embedded_size(2800, 100), None);
        assert_eq!(embedded_size(16_384, 16_384), None);
        assert_eq!(embedded_size(32_768, 100), Some((16_384, 50)));
        assert_eq!(embedded_size(2800, 70_000), Some((655, 16_384)));
        assert_eq!(embedded_size(1, 70_000), Some((1, 16_384)));
    }

    #[test]
    fn test_tall_composite_is_downscaled_before_embedding() {
        let tiles = vec![RgbImage::new(5, 70_000); 4];
        let composite = merge_horizontal(&tiles).unwrap();
        assert_eq!(composite.dimensions(), (20, 70_000));

        let bytes = render_pdf(&composite, &AggregatedResult::default()).unwrap();

        let doc = Document::load_mem(&bytes).unwrap();
        let image = doc
            .objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .find(|stream| {
                stream
                    .dict
                    .get(b"Subtype")
                    .and_then(Object::as_name)
                    .is_ok_and(|name| name == b"Image")
            })
            .expect("embedded image");
        let height = image.dict.get(b"Height").unwrap().as_i64().unwrap();
        let width = image.dict.get(b"Width").unwrap().as_i64().unwrap();
        assert_eq!((width, height), (5, 16_384));
    }

    #[test]
    fn test_listing_keeps_non_latin_class_names() {
        let composite = RgbImage::new(10, 10);
        let result: AggregatedResult = std::iter::once(GlobalDetection {
            class_id: 0,
            class_name: "трещина".into(),
            confidence: 0.9,
            bbox: [0.0; 4],
            polygon: Vec::new(),
        })
        .collect();

        let bytes = render_pdf(&composite, &result).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let text = doc.extract_text(&[1]).unwrap();

        assert_eq!(text, "Detections: 1\nтрещина: 0.90\n");
    }

    #[test]
    fn test_long_listing_spills_onto_more_pages() {
        let composite = RgbImage::new(10, 10);
        let result: AggregatedResult = (0..200)
            .map(|i| GlobalDetection {
                class_id: 0,
                class_name: "crack".into(),
                confidence: i as f32 / 200.0,
                bbox: [0.0; 4],
                polygon: Vec::new(),
            })
            .collect();

        let bytes = render_pdf(&composite, &result).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn test_collect_visualizations_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["s_r0_c10.png", "s_r0_c2.PNG", "s_r0_c1.jpeg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let names: Vec<String> = collect_visualizations(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["s_r0_c1.jpeg", "s_r0_c2.PNG", "s_r0_c10.png"]);
    }

    #[test]
    fn test_artifacts_iterate_row_major_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifacts = TileArtifacts::default();
        for (row, col) in [(1, 0), (0, 10), (0, 2)] {
            let path = dir.path().join(format!("t_r{row}_c{col}.png"));
            std::fs::write(&path, b"").unwrap();
            artifacts.insert(row, col, path);
        }

        let ordered: Vec<String> = artifacts
            .ordered_paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(ordered, vec!["t_r0_c2.png", "t_r0_c10.png", "t_r1_c0.png"]);

        assert_eq!(artifacts.remove_all(), 3);
        assert_eq!(artifacts.remove_all(), 0);
    }

    #[test]
    fn test_assemble_from_empty_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReportAssembler
            .assemble_from_dir(dir.path(), &AggregatedResult::default())
            .unwrap_err();
        assert!(matches!(err, TilingError::NoImagesToMerge));
    }

    #[test]
    fn test_assemble_with_no_detections() {
        let dir = tempfile::tempdir().unwrap();
        for col in 0..3 {
            RgbImage::from_pixel(4, 4, Rgb([col as u8 * 50, 0, 0]))
                .save(dir.path().join(format!("s_r0_c{col}.png")))
                .unwrap();
        }

        let report = ReportAssembler
            .assemble_from_dir(dir.path(), &AggregatedResult::default())
            .unwrap();

        assert_eq!(report.merged_image.dimensions(), (12, 4));
        assert_eq!(*report.merged_image.get_pixel(9, 0), Rgb([100, 0, 0]));
        assert!(report.document.starts_with(b"%PDF"));
    }
}
