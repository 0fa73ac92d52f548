#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifierThresholds {
    pub text: f32,
    pub ocr: f32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            text: 0.1,
            ocr: 0.1,
        }
    }
}

const TEXT_SHORT_LEN: usize = 3;
const OCR_SHORT_LEN: usize = 2;

impl ClassifierThresholds {
    pub fn should_skip(&self, text: &str) -> bool {
        skip_by_ratio(text, TEXT_SHORT_LEN, self.text)
    }

    pub fn is_ocr_valid(&self, text: &str) -> bool {
        !skip_by_ratio(text, OCR_SHORT_LEN, self.ocr)
    }
}

pub fn is_meaningful_char(ch: char) -> bool {
    if ch.is_ascii_alphabetic() {
        return true;
    }
    let code = ch as u32;
    matches!(
        code,
        // Latin-1 supplement letters and Latin extended A/B
        0x00C0..=0x00D6
            | 0x00D8..=0x00F6
            | 0x00F8..=0x024F
            // Arabic
            | 0x0600..=0x06FF
            | 0x0750..=0x077F
            // Thai
            | 0x0E00..=0x0E7F
            // Hangul jamo, compatibility jamo, syllables
            | 0x1100..=0x11FF
            | 0x3130..=0x318F
            | 0xAC00..=0xD7AF
            // Kana and CJK ideographs
            | 0x3040..=0x30FF
            | 0x31F0..=0x31FF
            | 0x3400..=0x4DBF
            | 0x4E00..=0x9FFF
            | 0xF900..=0xFAFF
    )
}

fn skip_by_ratio(text: &str, short_len: usize, threshold: f32) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    let total = trimmed.chars().count();
    let meaningful = trimmed.chars().filter(|ch| is_meaningful_char(*ch)).count();
    if meaningful == 0 {
        return true;
    }
    if total <= short_len {
        return false;
    }
    (meaningful as f32 / total as f32) < threshold
}
