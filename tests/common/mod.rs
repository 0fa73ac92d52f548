#![allow(dead_code)]

use futures_util::FutureExt;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use pptx_translator_rust::providers::{
    BackendFuture, TranslateFailure, TranslateRequest, TranslationBackend, TranslationOutcome,
};

#[derive(Debug, Default)]
struct Script {
    table: HashMap<String, String>,
    prefix: Option<String>,
    asked: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedBackend {
    script: Arc<Mutex<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, source: &str, translated: &str) -> Self {
        self.lock().table.insert(source.to_string(), translated.to_string());
        self
    }

    pub fn with_prefix(self, prefix: &str) -> Self {
        self.lock().prefix = Some(prefix.to_string());
        self
    }

    /// Every text sent, singles and batch items alike.
    pub fn asked(&self) -> Vec<String> {
        self.lock().asked.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn answer(&self, text: &str) -> TranslationOutcome {
        let mut script = self.lock();
        script.asked.push(text.to_string());
        if let Some(found) = script.table.get(text) {
            return TranslationOutcome::from_backend_text(found.clone());
        }
        match &script.prefix {
            Some(prefix) => TranslationOutcome::Translated(format!("{}{}", prefix, text)),
            None => TranslationOutcome::Translated(text.to_string()),
        }
    }
}

impl TranslationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn translate_one(&self, text: String, _request: TranslateRequest) -> BackendFuture<TranslationOutcome> {
        let outcome = self.answer(&text);
        async move { outcome }.boxed()
    }

    fn translate_batch(
        &self,
        texts: Vec<String>,
        _request: TranslateRequest,
    ) -> BackendFuture<Result<Vec<TranslationOutcome>, TranslateFailure>> {
        let outcomes: Vec<_> = texts.iter().map(|text| self.answer(text)).collect();
        async move { Ok(outcomes) }.boxed()
    }
}

const P_NS: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

pub fn text_box(id: u32, paragraphs: &str) -> String {
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="TextBox {id}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr wrap="square"><a:spAutoFit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>"#
    )
}

pub fn red_paragraph(text: &str) -> String {
    format!(
        r#"<a:p><a:r><a:rPr lang="en-US" sz="2400" dirty="0"><a:solidFill><a:srgbClr val="C00000"/></a:solidFill></a:rPr><a:t>{text}</a:t></a:r></a:p>"#
    )
}

pub fn table(id: u32, cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|text| {
            format!(r#"<a:tc><a:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang="en-US"/><a:t>{text}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>"#)
        })
        .collect();
    format!(
        r#"<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id="{id}" name="Table {id}"/><p:cNvGraphicFramePr/><p:nvPr/></p:nvGraphicFramePr><p:xfrm/><a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/table"><a:tbl><a:tblGrid/><a:tr h="370840">{cells}</a:tr></a:tbl></a:graphicData></a:graphic></p:graphicFrame>"#
    )
}

pub fn deck(slides: &[String]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    let mut put = |name: String, data: String| {
        zip.start_file(name, options).expect("start file");
        zip.write_all(data.as_bytes()).expect("write file");
    };

    let overrides: String = (1..=slides.len())
        .map(|n| format!(r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#))
        .collect();
    put(
        "[Content_Types].xml".to_string(),
        format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>{overrides}</Types>"#),
    );
    put(
        "_rels/.rels".to_string(),
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/></Relationships>"#.to_string(),
    );
    let ids: String = (1..=slides.len())
        .map(|n| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + n, n))
        .collect();
    put(
        "ppt/presentation.xml".to_string(),
        format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:presentation xmlns:p="{P_NS}" xmlns:a="{A_NS}" xmlns:r="{R_NS}"><p:sldIdLst>{ids}</p:sldIdLst></p:presentation>"#),
    );
    let rels: String = (1..=slides.len())
        .map(|n| format!(r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{n}.xml"/>"#))
        .collect();
    put(
        "ppt/_rels/presentation.xml.rels".to_string(),
        format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#),
    );
    for (idx, shapes) in slides.iter().enumerate() {
        let n = idx + 1;
        put(
            format!("ppt/slides/slide{n}.xml"),
            format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><p:sld xmlns:p="{P_NS}" xmlns:a="{A_NS}" xmlns:r="{R_NS}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/>{shapes}</p:spTree></p:cSld></p:sld>"#),
        );
    }
    drop(put);
    zip.finish().expect("finish zip").into_inner()
}
