use super::*;
use crate::accessibility::effective_alt_text;
use crate::raster::EncodingFormat;
use crate::testing::StubRasterizer;
use crate::types::AccessibilityLevel;
use folio_common::MathDelimiters;

const RED_TRIANGLE: &str = "\\begin{figure}\n\
                            % @alt: A red triangle\n\
                            \\includegraphics{triangle.png}\n\
                            \\caption{Shapes}\n\
                            \\end{figure}\n";

const SHAPES: &str = "% @decorative\n\
                      \\includegraphics{shape.png}\n\
                      \n\
                      Some text in between.\n\
                      \n\
                      % @alt: Triangle diagram\n\
                      \\includegraphics{shape.png}\n";

const SHAPES_HTML: &str =
    r#"<p><img src="shape.png" alt="shape.png"></p><p>Some text in between.</p><p><img src="shape.png" alt="shape.png"></p>"#;

fn quiet_config() -> ExportConfig {
    ExportConfig {
        retypeset: Retypeset::None,
        title: Some("Notes".to_owned()),
        ..Default::default()
    }
}

/// Session with a pass-through rasterizer and an inspectable preview store.
fn test_session(config: ExportConfig) -> (ExportSession, Arc<MemoryPreviewStore>) {
    let previews = Arc::new(MemoryPreviewStore::new());
    let session = ExportSession::with_parts(
        config,
        Arc::new(StubRasterizer),
        previews.clone(),
        Arc::new(TracingNotifier),
    );
    (session, previews)
}

fn imgs(html: &str) -> Vec<Element> {
    Document::parse(html)
        .elements_named("img")
        .into_iter()
        .cloned()
        .collect()
}

#[test]
fn red_triangle_is_good_with_its_alt_text() {
    let session = ExportSession::default();
    let fragments = session.detect_image_references(RED_TRIANGLE);
    assert_eq!(fragments.len(), 1);
    let fragment = &fragments[0];
    assert_eq!(fragment.caption_text.as_deref(), Some("Shapes"));
    assert_eq!(effective_alt_text(fragment), "A red triangle");
    assert_eq!(fragment.accessibility_status.level, AccessibilityLevel::Good);
    assert!(fragment.accessibility_status.warnings.is_empty());
}

#[test]
fn accessibility_report_serializes() {
    let session = ExportSession::default();
    let rows = session.accessibility_report(SHAPES);
    assert_eq!(rows.len(), 2);
    let json = serde_json::to_value(&rows).unwrap();
    assert_eq!(json[0]["filename"], "shape.png");
    assert_eq!(json[0]["level"], "optimal");
    assert_eq!(json[1]["line"], 7);
    assert_eq!(json[1]["level"], "good");
}

#[tokio::test]
async fn duplicated_filename_exports_per_occurrence() {
    let (mut session, _) = test_session(quiet_config());
    session.register_image("shape.png", &b"shape"[..]).await.unwrap();

    let artifact = session.export_artifact(SHAPES, SHAPES_HTML);
    let imgs = imgs(&artifact.html);
    assert_eq!(imgs.len(), 2);

    assert_eq!(imgs[0].attr("alt"), Some(""));
    assert_eq!(imgs[0].attr("role"), Some("presentation"));
    assert_eq!(imgs[1].attr("alt"), Some("Triangle diagram"));
    assert_eq!(imgs[1].attr("role"), None);
    for img in &imgs {
        assert_eq!(img.attr("src"), Some("data:image/png;base64,c2hhcGU="));
    }
    assert!(artifact.warnings.is_empty());
    assert!(artifact.missing.is_empty());
}

#[tokio::test]
async fn decorative_images_always_get_presentation_role() {
    let source = "% @decorative\n% @alt: ignored\n\\includegraphics{rule.png}\n\
                  % @decorative\n\\includegraphics{rule.png}\n";
    let (mut session, _) = test_session(quiet_config());
    session.register_image("rule.png", &b"rule"[..]).await.unwrap();
    session.load_source(source);

    let html =
        session.replace_images_for_export(r#"<img src="rule.png" alt="x"><img src="rule.png">"#);
    for img in imgs(&html) {
        assert_eq!(img.attr("alt"), Some(""));
        assert_eq!(img.attr("role"), Some("presentation"));
    }
}

#[tokio::test]
async fn lossless_encoding_wins_for_flat_images() {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    let flat = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([220, 20, 60])));
    let mut png = Vec::new();
    flat.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

    let session = ExportSession::default();
    let entry = session.register_image("flat.png", png).await.unwrap();
    assert_eq!(entry.format, EncodingFormat::Png);
    assert!(entry.data_url.starts_with("data:image/png;base64,"));
    assert_eq!(entry.source_mime_type, "image/png");
    assert_eq!((entry.width, entry.height), (64, 64));
}

#[tokio::test]
async fn corrupt_upload_is_rejected() {
    let session = ExportSession::default();
    let err = session
        .register_image("broken.png", &b"not an image"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, ExportError::Decode { .. }));
    assert!(session.registry().is_empty());
}

#[tokio::test]
async fn missing_images_are_listed() {
    let (session, _) = test_session(quiet_config());
    assert!(!session.all_images_available(SHAPES));
    assert_eq!(session.missing_images(SHAPES).len(), 2);

    session.register_image("shape.png", &b"shape"[..]).await.unwrap();
    assert!(session.all_images_available(SHAPES));

    assert!(session.remove_image("shape.png"));
    assert_eq!(session.missing_images(RED_TRIANGLE)[0].filename, "triangle.png");
}

#[tokio::test]
async fn missing_registry_entry_never_aborts_export() {
    let (mut session, _) = test_session(quiet_config());
    let artifact = session.export_artifact(SHAPES, SHAPES_HTML);

    let imgs = imgs(&artifact.html);
    assert_eq!(imgs[0].attr("src"), Some("shape.png"));
    assert_eq!(imgs[1].attr("alt"), Some("Triangle diagram"));
    assert_eq!(artifact.images.missing, ["shape.png"]);
    assert_eq!(artifact.missing.len(), 2);
    assert!(!artifact.warnings.is_empty());
}

#[tokio::test]
async fn overflow_occurrences_keep_converter_alt() {
    let source = "% @alt: Only once\n\\includegraphics{logo.png}\n";
    let (mut session, _) = test_session(quiet_config());
    session.register_image("logo.png", &b"logo"[..]).await.unwrap();
    session.load_source(source);

    let html = session.replace_images_for_export(
        r#"<img src="logo.png" alt="logo"><img src="logo.png" alt="logo">"#,
    );
    let imgs = imgs(&html);
    assert_eq!(imgs[0].attr("alt"), Some("Only once"));
    assert_eq!(imgs[1].attr("alt"), Some("logo"));
    // the overflowing element is still embedded
    assert!(imgs[1].attr("src").unwrap().starts_with("data:"));
}

#[tokio::test]
async fn extensionless_source_reference_is_embedded() {
    let (mut session, _) = test_session(quiet_config());
    session.load_source("% @alt: A red triangle\n\\includegraphics{shape}\n");
    session.register_image("shape", &b"shape"[..]).await.unwrap();
    assert!(session.all_images_available("\\includegraphics{shape}\n"));

    let html = session.replace_images_for_export(r#"<img src="shape.png" alt="shape">"#);
    let imgs = imgs(&html);
    assert_eq!(imgs[0].attr("src"), Some("data:image/png;base64,c2hhcGU="));
    assert_eq!(imgs[0].attr("alt"), Some("A red triangle"));
}

#[tokio::test]
async fn preview_then_export_keeps_one_long_description() {
    let source = "% @alt: Wiring diagram\n\
                  % @longdesc: A battery feeds two bulbs\n\
                  % wired in parallel.\n\
                  \\includegraphics{circuit.png}\n";
    let (mut session, previews) = test_session(quiet_config());
    let entry = session.register_image("circuit.png", &b"circuit"[..]).await.unwrap();
    session.load_source(source);

    let mut document = Document::parse(r#"<p><img src="circuit.png"></p>"#);
    assert_eq!(session.replace_images_for_preview(&mut document), 1);
    let preview = document.elements_named("img")[0];
    assert_eq!(preview.attr("src"), Some(entry.preview_url.as_str()));
    assert!(previews.is_live(&entry.preview_url));

    let exported = session.replace_images_for_export(&document.to_html());
    let exported = Document::parse(&exported);
    let details = exported.elements_named("details");
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].attr("id"), Some("longdesc-circuit-png-1"));
    assert!(
        details[0]
            .text_content()
            .ends_with("A battery feeds two bulbs wired in parallel.")
    );
    let img = exported.elements_named("img")[0];
    assert_eq!(img.attr("aria-describedby"), Some("longdesc-circuit-png-1"));
    assert!(img.attrs.iter().all(|(name, _)| !name.starts_with("data-folio-")));
}

#[tokio::test]
async fn single_line_export_snapshot() {
    let (mut session, _) = test_session(quiet_config());
    session.register_image("dot.png", &b"dot"[..]).await.unwrap();
    session.load_source("% @alt: A dot\n\\includegraphics{dot.png}\n");

    let html = session.replace_images_for_export(r#"<p><img src="dot.png" alt=""></p>"#);
    insta::assert_snapshot!(html, @r#"<p><img src="data:image/png;base64,ZG90" alt="A dot"></p>"#);
}

#[tokio::test]
async fn full_artifact_wraps_fragment() {
    let (mut session, _) = test_session(quiet_config());
    session.register_image("dot.png", &b"dot"[..]).await.unwrap();

    let rendered = concat!(
        r#"<p>See <span class="katex"><span class="katex-mathml"><math><semantics><mi>x</mi>"#,
        r#"<annotation encoding="application/x-tex">x^2</annotation></semantics></math></span>"#,
        r#"<span class="katex-html" aria-hidden="true">x2</span></span>.</p>"#,
        r#"<p><img src="dot.png" alt=""></p>"#,
    );
    let source = "See $x^2$.\n\n% @alt: A dot\n\\includegraphics{dot.png}\n";
    let artifact = session.export_artifact(source, rendered);

    let expected = concat!(
        "<!DOCTYPE html>\n",
        "<html lang=\"en\">\n",
        "<head>\n",
        "  <meta charset=\"utf-8\">\n",
        "  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
        "  <title>Notes</title>\n",
        "</head>\n",
        "<body>\n",
        "<p>See \\(x^2\\).</p><p><img src=\"data:image/png;base64,ZG90\" alt=\"A dot\"></p>\n",
        "</body>\n",
        "</html>\n",
    );
    assert_eq!(artifact.html, expected);
    assert_eq!(artifact.math.semantic, 1);
    assert_eq!(artifact.images.replaced, 1);
}

#[tokio::test]
async fn katex_assets_follow_configuration() {
    let config = ExportConfig {
        math_delimiters: MathDelimiters::Dollars,
        ..Default::default()
    };
    let (mut session, _) = test_session(config);
    let rendered = r#"<span class="katex-display"><span class="katex"><span class="katex-mathml"><math display="block"><semantics><mi>y</mi><annotation encoding="application/x-tex">y</annotation></semantics></math></span></span></span>"#;
    let artifact = session.export_artifact("", rendered);
    assert!(artifact.html.contains("katex.min.css"));
    assert!(artifact.html.contains("renderMathInElement(document.body, {delimiters:"));
    assert!(artifact.html.contains("<body>\n$$y$$\n</body>"));
    assert!(artifact.html.contains("<title>Untitled</title>"));
}

fn onload_of_head_script(config: ExportConfig) -> String {
    let html = write_document(&config, &Document::parse_fragment("<p>x</p>"));
    let document = Document::parse(&html);
    document
        .elements_named("script")
        .into_iter()
        .find_map(|script| script.attr("onload"))
        .unwrap()
        .to_owned()
}

#[test]
fn auto_render_delimiters_follow_configuration() {
    let dollars = onload_of_head_script(ExportConfig {
        math_delimiters: MathDelimiters::Dollars,
        ..Default::default()
    });
    assert!(dollars.contains("{left: '$$', right: '$$', display: true}"));
    assert!(dollars.contains("{left: '$', right: '$', display: false}"));

    let brackets = onload_of_head_script(ExportConfig::default());
    assert!(brackets.contains(r"{left: '\\[', right: '\\]', display: true}"));
    assert!(brackets.contains(r"{left: '\\(', right: '\\)', display: false}"));
}

#[tokio::test]
async fn full_documents_get_assets_in_their_head() {
    let (mut session, _) = test_session(ExportConfig::default());
    let rendered =
        "<!DOCTYPE html><html><head><title>Paper</title></head><body><p>x</p></body></html>";
    let artifact = session.export_artifact("", rendered);
    let document = Document::parse(&artifact.html);
    let links = document.elements_named("link");
    assert_eq!(links.len(), 1);
    assert!(artifact.html.contains("<title>Paper</title><link rel=\"stylesheet\""));
}

#[tokio::test]
async fn reloading_the_source_rebuilds_the_map() {
    let (mut session, _) = test_session(quiet_config());
    session.load_source(SHAPES);
    assert_eq!(session.occurrences().occurrence_count(), 2);
    session.load_source(RED_TRIANGLE);
    assert_eq!(session.occurrences().occurrence_count(), 1);
    assert!(session.occurrences().get("shape.png").is_none());
}

#[tokio::test]
async fn dispose_revokes_previews() {
    let (session, previews) = test_session(quiet_config());
    session.register_image("a.png", &b"a"[..]).await.unwrap();
    session.register_image("b.png", &b"b"[..]).await.unwrap();
    assert_eq!(previews.live_count(), 2);
    session.dispose();
    assert_eq!(previews.live_count(), 0);
}

#[test]
fn math_conversion_uses_configured_delimiters() {
    let session = ExportSession::new(ExportConfig {
        math_delimiters: MathDelimiters::Dollars,
        ..Default::default()
    });
    let markup = r#"<math><semantics><mi>z</mi><annotation encoding="application/x-tex">z</annotation></semantics></math>"#;
    assert_eq!(session.convert_rendered_math_to_source(markup), "$z$");
}

#[tokio::test]
async fn export_warnings_reach_the_notifier() {
    use crate::notify::CollectingNotifier;

    let notifier = Arc::new(CollectingNotifier::new());
    let mut session = ExportSession::with_parts(
        quiet_config(),
        Arc::new(StubRasterizer),
        Arc::new(MemoryPreviewStore::new()),
        notifier.clone(),
    );
    let artifact = session.export_artifact(SHAPES, SHAPES_HTML);

    let messages = notifier.messages();
    // one per pass warning plus the missing-image summary
    assert_eq!(messages.len(), artifact.warnings.len() + 1);
    assert!(messages.iter().all(|(level, _)| *level == NotifyLevel::Warning));
    assert!(messages.last().unwrap().1.starts_with("2 image occurrence(s)"));
}
