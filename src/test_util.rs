use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::providers::{
    BackendFuture, TranslateFailure, TranslateRequest, TranslationBackend, TranslationOutcome,
};

pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: Mutex<()> = Mutex::new(());
    let _guard = HOME_MUTEX.lock().unwrap_or_else(|poison| poison.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    let old_base = std::env::var(crate::paths::BASE_DIR_ENV).ok();
    unsafe {
        std::env::set_var("HOME", dir.path());
        std::env::remove_var(crate::paths::BASE_DIR_ENV);
    }
    let result = func(dir.path());
    unsafe {
        match old_home {
            Some(old) => std::env::set_var("HOME", old),
            None => std::env::remove_var("HOME"),
        }
        if let Some(old) = old_base {
            std::env::set_var(crate::paths::BASE_DIR_ENV, old);
        }
    }
    result
}

#[derive(Debug, Default)]
struct StubState {
    table: HashMap<String, String>,
    failing: HashSet<String>,
    prefix: Option<String>,
    drop_from_batch: usize,
    single_calls: usize,
    batches: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct StubBackend {
    state: Arc<Mutex<StubState>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StubState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn with(self, source: &str, translated: &str) -> Self {
        self.lock()
            .table
            .insert(source.to_string(), translated.to_string());
        self
    }

    pub fn failing(self, source: &str) -> Self {
        self.lock().failing.insert(source.to_string());
        self
    }

    pub fn with_prefix(self, prefix: &str) -> Self {
        self.lock().prefix = Some(prefix.to_string());
        self
    }

    pub fn dropping_from_batch(self, count: usize) -> Self {
        self.lock().drop_from_batch = count;
        self
    }

    pub fn single_calls(&self) -> usize {
        self.lock().single_calls
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.lock().batches.clone()
    }

    fn answer(state: &StubState, text: &str) -> TranslationOutcome {
        if state.failing.contains(text) {
            return TranslationOutcome::Failed(TranslateFailure::Status(500));
        }
        if let Some(found) = state.table.get(text) {
            return TranslationOutcome::from_backend_text(found.clone());
        }
        match &state.prefix {
            Some(prefix) => TranslationOutcome::Translated(format!("{}{}", prefix, text)),
            None => TranslationOutcome::Translated(text.to_string()),
        }
    }
}

impl TranslationBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn translate_one(&self, text: String, _request: TranslateRequest) -> BackendFuture<TranslationOutcome> {
        let outcome = {
            let mut state = self.lock();
            state.single_calls += 1;
            Self::answer(&state, &text)
        };
        async move { outcome }.boxed()
    }

    fn translate_batch(
        &self,
        texts: Vec<String>,
        _request: TranslateRequest,
    ) -> BackendFuture<Result<Vec<TranslationOutcome>, TranslateFailure>> {
        let outcomes = {
            let mut state = self.lock();
            state.batches.push(texts.clone());
            let mut outcomes: Vec<TranslationOutcome> =
                texts.iter().map(|text| Self::answer(&state, text)).collect();
            let keep = outcomes.len().saturating_sub(state.drop_from_batch);
            outcomes.truncate(keep);
            outcomes
        };
        async move { Ok(outcomes) }.boxed()
    }
}

const P_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub(crate) fn text_shape(id: u32, name: &str, paragraphs: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name}"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr><a:normAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#
    )
}

pub(crate) fn table_frame(id: u32, name: &str, cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|text| {
            format!(r#"<a:tc><a:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang="en-US" sz="1400"/><a:t>{text}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>"#)
        })
        .collect();
    format!(
        r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="{id}" name="{name}"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tblGrid/><a:tr h="370840">{cells}</a:tr></a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#
    )
}

pub(crate) fn picture_shape(id: u32, name: &str, rel_id: &str) -> String {
    format!(
        r#"<p:pic><p:nvPicPr><p:cNvPr id="{id}" name="{name}"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="{rel_id}"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="914400" cy="457200"/></a:xfrm></p:spPr></p:pic>"#
    )
}

/// Each slide is (shape tree markup, relationship markup).
pub(crate) fn build_deck(slides: &[(String, String)], media: &[(&str, Vec<u8>)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::FileOptions;

    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = FileOptions::default();
    let mut put = |name: &str, data: &[u8]| {
        zip.start_file(name, options).expect("start file");
        zip.write_all(data).expect("write file");
    };

    let slide_overrides: String = (1..=slides.len())
        .map(|n| format!(r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#))
        .collect();
    put(
        "[Content_Types].xml",
        format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>{slide_overrides}</Types>"#).as_bytes(),
    );
    put(
        "_rels/.rels",
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#,
    );

    let ids: String = (1..=slides.len())
        .map(|n| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + n, n))
        .collect();
    put(
        "ppt/presentation.xml",
        format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation xmlns:p="{P_NS}" xmlns:a="{A_NS}" xmlns:r="{R_NS}"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#).as_bytes(),
    );
    let rels: String = (1..=slides.len())
        .map(|n| format!(r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{n}.xml"/>"#))
        .collect();
    put(
        "ppt/_rels/presentation.xml.rels",
        format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#).as_bytes(),
    );

    for (idx, (shapes, slide_rels)) in slides.iter().enumerate() {
        let n = idx + 1;
        put(
            &format!("ppt/slides/slide{n}.xml"),
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:p="{P_NS}" xmlns:a="{A_NS}" xmlns:r="{R_NS}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"#).as_bytes(),
        );
        put(
            &format!("ppt/slides/_rels/slide{n}.xml.rels"),
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{slide_rels}</Relationships>"#).as_bytes(),
        );
    }
    for (name, data) in media {
        put(&format!("ppt/media/{name}"), data);
    }
    drop(put);
    zip.finish().expect("finish zip").into_inner()
}

pub(crate) fn sample_deck() -> Vec<u8> {
    let shapes = [
        text_shape(
            2,
            "Title 1",
            r#"<a:p><a:r><a:rPr lang="en-US" sz="3200" b="1"/><a:t>Hello world</a:t></a:r></a:p>"#,
        ),
        text_shape(3, "Label 2", r#"<a:p><a:r><a:t>42</a:t></a:r></a:p>"#),
        table_frame(4, "Table 3", &["Region", "  ", "North"]),
    ]
    .concat();
    build_deck(&[(shapes, String::new())], &[])
}
