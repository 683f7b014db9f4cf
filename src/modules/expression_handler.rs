/// Display text per raw classifier label. The idle class renders as the
/// waiting placeholder.
const DISPLAY_MAPPING: &[(&str, &str)] = &[
    ("binh_thuong", "..."),
    ("buoi_sang", "Buổi sáng"),
    ("buoi_toi", "Buổi tối"),
    ("con_cho", "Con chó"),
    ("con_ga", "Con gà"),
    ("con_gian", "Con gián"),
    ("con_meo", "Con mèo"),
    ("con_muoi", "Con muỗi"),
    ("nhom", "Nhóm"),
    ("xin_chao", "Xin chào"),
    ("xin_loi", "Xin lỗi"),
];

/// Narration text per raw classifier label. Kept separate from the display
/// table: the idle class must never be spoken.
const SPEECH_MAPPING: &[(&str, &str)] = &[
    ("binh_thuong", ""),
    ("buoi_sang", "Buổi sáng"),
    ("buoi_toi", "Buổi tối"),
    ("con_cho", "Con chó"),
    ("con_ga", "Con gà"),
    ("con_gian", "Con gián"),
    ("con_meo", "Con mèo"),
    ("con_muoi", "Con muỗi"),
    ("nhom", "Nhóm"),
    ("xin_chao", "Xin chào"),
    ("xin_loi", "Xin lỗi"),
];

fn lookup(table: &[(&str, &'static str)], label: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| *key == label)
        .map(|(_, text)| *text)
}

/// Holds the label most recently accepted for the frame and resolves it to
/// presentation text. Unmapped labels pass through unchanged.
#[derive(Debug, Clone, Default)]
pub struct ExpressionHandler {
    current_label: String,
}

impl ExpressionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the current label; no history is kept.
    pub fn receive(&mut self, label: &str) {
        self.current_label.clear();
        self.current_label.push_str(label);
    }

    pub fn current_label(&self) -> &str {
        &self.current_label
    }

    pub fn get_message(&self) -> &str {
        lookup(DISPLAY_MAPPING, &self.current_label).unwrap_or(&self.current_label)
    }

    pub fn get_speech_message(&self) -> &str {
        lookup(SPEECH_MAPPING, &self.current_label).unwrap_or(&self.current_label)
    }
}
