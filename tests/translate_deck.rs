mod common;

use std::io::Read;
use std::path::Path;

use common::{ScriptedBackend, deck, red_paragraph, table, text_box};
use pptx_translator_rust::ooxml::{Presentation, ShapeKind, text};
use pptx_translator_rust::style::{ColorSpec, Rgb, StyleSnapshot};
use pptx_translator_rust::{CancelToken, Job, RunStatus, TranslateOptions, Translator};

fn korean(backend: ScriptedBackend, cancel: CancelToken) -> Translator<ScriptedBackend> {
    let options = TranslateOptions {
        source_lang: "en".to_string(),
        target_lang: "ko".to_string(),
        model: "stub".to_string(),
    };
    Translator::new(backend, options, cancel)
}

fn write_deck(dir: &Path, slides: &[String]) -> std::path::PathBuf {
    let input = dir.join("deck.pptx");
    std::fs::write(&input, deck(slides)).expect("write deck");
    input
}

fn slide_texts(presentation: &Presentation) -> Vec<String> {
    let slide = presentation.slide(0).expect("slide");
    let mut texts = Vec::new();
    for shape in presentation.shapes(0) {
        match shape.kind {
            ShapeKind::Text => {
                let body = slide.xml.first_child_named(shape.node, "txBody").expect("body");
                texts.push(text::frame_text(&slide.xml, body));
            }
            ShapeKind::Table => {
                for cell in presentation.table_cells(0, shape.node) {
                    texts.push(text::frame_text(&slide.xml, cell.body));
                }
            }
            ShapeKind::Picture => {}
        }
    }
    texts
}

fn zip_part(path: &Path, name: &str) -> Vec<u8> {
    let file = std::fs::File::open(path).expect("open");
    let mut archive = zip::ZipArchive::new(file).expect("zip");
    let mut entry = archive.by_name(name).expect("part");
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes).expect("read part");
    bytes
}

#[tokio::test]
async fn hello_world_keeps_size_and_color() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_deck(dir.path(), &[text_box(2, &red_paragraph("Hello world"))]);
    let translator = korean(ScriptedBackend::new().with("Hello world", "안녕 세상"), CancelToken::new());

    let report = Job::new(&input).run(&translator, |_| {}).await.expect("run");
    assert_eq!(report.status, RunStatus::Completed);
    let output = report.output.expect("output");
    assert!(output.ends_with("deck_ko_translated.pptx"));

    let presentation = Presentation::open(&output).expect("open output");
    let slide = presentation.slide(0).expect("slide");
    let shape = presentation.shapes(0)[0].node;
    let body = slide.xml.first_child_named(shape, "txBody").expect("body");
    let paragraphs = text::paragraphs(&slide.xml, body);
    assert_eq!(paragraphs.len(), 1);
    assert_eq!(text::runs(&slide.xml, paragraphs[0]).len(), 1);
    assert_eq!(text::frame_text(&slide.xml, body), "안녕 세상");

    let snapshot = StyleSnapshot::capture(&slide.xml, &slide.rels, body);
    let run = &snapshot.paragraphs[0].runs[0];
    assert_eq!(run.size, Some(2400));
    assert_eq!(run.color, Some(ColorSpec::Rgb(Rgb(0xC0, 0, 0))));
}

#[tokio::test]
async fn whitespace_cell_is_never_sent_or_changed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_deck(dir.path(), &[table(2, &["Revenue", "   "])]);
    let backend = ScriptedBackend::new().with_prefix("KO:");
    let translator = korean(backend.clone(), CancelToken::new());

    let report = Job::new(&input).run(&translator, |_| {}).await.expect("run");
    let presentation = Presentation::open(&report.output.expect("output")).expect("open");

    assert_eq!(slide_texts(&presentation), vec!["KO:Revenue", "   "]);
    assert_eq!(backend.asked(), vec!["Revenue"]);
}

#[tokio::test]
async fn cancelling_after_two_units_saves_a_stopped_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let shapes: Vec<String> = ["One", "Two", "Three", "Four", "Five"]
        .iter()
        .enumerate()
        .map(|(idx, word)| text_box(idx as u32 + 2, &red_paragraph(word)))
        .collect();
    let input = write_deck(dir.path(), &[shapes.concat()]);
    let cancel = CancelToken::new();
    let translator = korean(ScriptedBackend::new().with_prefix("KO:"), cancel.clone());

    let report = Job::new(&input)
        .run(&translator, |event| {
            if event.processed == 2 {
                cancel.cancel();
            }
        })
        .await
        .expect("run");

    assert_eq!(report.status, RunStatus::Stopped);
    assert_eq!(report.processed, 2);
    let output = report.output.expect("output");
    assert!(output.ends_with("deck_ko_translated_stopped.pptx"));
    assert!(!dir.path().join("deck_ko_translated.pptx").exists());

    let presentation = Presentation::open(&output).expect("open");
    assert_eq!(
        slide_texts(&presentation),
        vec!["KO:One", "KO:Two", "Three", "Four", "Five"]
    );
}

#[tokio::test]
async fn one_paragraph_per_translated_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_deck(dir.path(), &[text_box(2, &red_paragraph("Agenda"))]);
    let translator = korean(
        ScriptedBackend::new().with("Agenda", "의제\n\n개요\r\n요약"),
        CancelToken::new(),
    );

    let report = Job::new(&input).run(&translator, |_| {}).await.expect("run");
    let presentation = Presentation::open(&report.output.expect("output")).expect("open");
    let slide = presentation.slide(0).expect("slide");
    let body = slide
        .xml
        .first_child_named(presentation.shapes(0)[0].node, "txBody")
        .expect("body");

    let paragraphs = text::paragraphs(&slide.xml, body);
    assert_eq!(paragraphs.len(), 4);
    assert_eq!(text::paragraph_text(&slide.xml, paragraphs[1]), " ");
    let snapshot = StyleSnapshot::capture(&slide.xml, &slide.rels, body);
    assert!(snapshot.paragraphs.iter().all(|p| p.runs[0].size == Some(2400)));
}

#[tokio::test]
async fn skipped_slides_are_byte_identical() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = write_deck(
        dir.path(),
        &[
            [text_box(2, &red_paragraph("2024")), text_box(3, &red_paragraph("-- %"))].concat(),
            text_box(2, &red_paragraph("Summary")),
        ],
    );
    let backend = ScriptedBackend::new().with_prefix("KO:");
    let translator = korean(backend.clone(), CancelToken::new());

    let report = Job::new(&input).run(&translator, |_| {}).await.expect("run");
    let output = report.output.expect("output");

    assert_eq!(
        zip_part(&input, "ppt/slides/slide1.xml"),
        zip_part(&output, "ppt/slides/slide1.xml")
    );
    assert_ne!(
        zip_part(&input, "ppt/slides/slide2.xml"),
        zip_part(&output, "ppt/slides/slide2.xml")
    );
    assert_eq!(backend.asked(), vec!["Summary"]);
}
