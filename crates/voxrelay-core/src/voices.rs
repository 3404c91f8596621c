//! Voice catalog entries, locale filtering, and output encodings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One synthesis voice, shaped like an entry of the Edge voice-list JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Voice {
    #[serde(default)]
    pub name: String,
    /// Provider-specific voice id.
    pub short_name: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub locale: String,
    #[serde(default, alias = "FriendlyName", alias = "DisplayName")]
    pub local_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate_hertz: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words_per_minute: Option<String>,
    /// Curated display label, set for built-in voices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Voice {
    pub fn id(&self) -> &str {
        &self.short_name
    }

    /// Human-readable label: the curated one when present, else derived,
    /// e.g. `Denise (fr-FR, Female)`.
    pub fn label(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        let name = if self.local_name.is_empty() {
            &self.short_name
        } else {
            &self.local_name
        };
        match (self.locale.is_empty(), self.gender.is_empty()) {
            (false, false) => format!("{name} ({}, {})", self.locale, self.gender),
            (false, true) => format!("{name} ({})", self.locale),
            _ => name.to_string(),
        }
    }

    fn is_female(&self) -> bool {
        self.gender.eq_ignore_ascii_case("female")
    }
}

// ─── Built-in table ────────────────────────────────────────────────────────

/// (short name, gender, local name, display label)
const BUILTIN: &[(&str, &str, &str, &str)] = &[
    ("zh-CN-XiaoxiaoNeural", "Female", "Xiaoxiao", "中文女声 (晓晓)"),
    ("zh-CN-YunxiNeural", "Male", "Yunxi", "中文男声 (云希)"),
    ("zh-CN-YunyangNeural", "Male", "Yunyang", "中文男声 (云扬)"),
    ("zh-CN-XiaoyiNeural", "Female", "Xiaoyi", "中文女声 (晓伊)"),
    ("zh-CN-YunjianNeural", "Male", "Yunjian", "中文男声 (云健)"),
    ("zh-CN-XiaochenNeural", "Female", "Xiaochen", "中文女声 (晓辰)"),
    ("zh-CN-XiaohanNeural", "Female", "Xiaohan", "中文女声 (晓涵)"),
    ("zh-CN-XiaomengNeural", "Female", "Xiaomeng", "中文女声 (晓梦)"),
    ("zh-CN-XiaomoNeural", "Female", "Xiaomo", "中文女声 (晓墨)"),
    ("zh-CN-XiaoqiuNeural", "Female", "Xiaoqiu", "中文女声 (晓秋)"),
    ("zh-CN-XiaoruiNeural", "Female", "Xiaorui", "中文女声 (晓睿)"),
    ("zh-CN-XiaoshuangNeural", "Female", "Xiaoshuang", "中文女声 (晓双)"),
    ("zh-CN-XiaoxuanNeural", "Female", "Xiaoxuan", "中文女声 (晓萱)"),
    ("zh-CN-XiaoyanNeural", "Female", "Xiaoyan", "中文女声 (晓颜)"),
    ("zh-CN-XiaoyouNeural", "Female", "Xiaoyou", "中文女声 (晓悠)"),
    ("zh-CN-XiaozhenNeural", "Female", "Xiaozhen", "中文女声 (晓甄)"),
    ("zh-CN-YunfengNeural", "Male", "Yunfeng", "中文男声 (云枫)"),
    ("zh-CN-YunhaoNeural", "Male", "Yunhao", "中文男声 (云皓)"),
    ("zh-CN-YunxiaNeural", "Male", "Yunxia", "中文男声 (云夏)"),
    ("zh-CN-YunyeNeural", "Male", "Yunye", "中文男声 (云野)"),
    ("zh-CN-YunzeNeural", "Male", "Yunze", "中文男声 (云泽)"),
    ("en-US-JennyNeural", "Female", "Jenny", "英文女声 (Jenny)"),
    ("en-US-GuyNeural", "Male", "Guy", "英文男声 (Guy)"),
    ("en-US-AriaNeural", "Female", "Aria", "英文女声 (Aria)"),
    ("en-US-DavisNeural", "Male", "Davis", "英文男声 (Davis)"),
];

/// The fixed voice table served when no upstream listing is configured.
pub fn builtin_voices() -> Vec<Voice> {
    BUILTIN
        .iter()
        .map(|&(short_name, gender, local_name, label)| {
            let locale = short_name.splitn(3, '-').take(2).collect::<Vec<_>>().join("-");
            Voice {
                name: format!(
                    "Microsoft Server Speech Text to Speech Voice ({locale}, {})",
                    &short_name[locale.len() + 1..]
                ),
                short_name: short_name.to_string(),
                gender: gender.to_string(),
                locale,
                local_name: local_name.to_string(),
                sample_rate_hertz: Some("24000".into()),
                words_per_minute: None,
                label: Some(label.to_string()),
            }
        })
        .collect()
}

// ─── Filtering & encodings ─────────────────────────────────────────────────

/// Keep voices whose locale contains `needle`, case-insensitively.
/// An empty needle keeps everything.
pub fn filter_by_locale(voices: Vec<Voice>, needle: &str) -> Vec<Voice> {
    let needle = needle.trim().to_lowercase();
    if needle.is_empty() {
        return voices;
    }
    voices
        .into_iter()
        .filter(|v| v.locale.to_lowercase().contains(&needle))
        .collect()
}

/// Requested catalog encoding (`f` query parameter).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// YAML-like speaker list for multi-TTS reader plugins (`f=0`).
    PluginText,
    /// Voice id → display label (`f=1`).
    LabelMap,
    /// Full structured list (anything else).
    Full,
}

impl CatalogFormat {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("0") => Self::PluginText,
            Some("1") => Self::LabelMap,
            _ => Self::Full,
        }
    }
}

/// A rendered catalog, ready to serve.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogBody {
    Json(serde_json::Value),
    Text(String),
}

pub fn render(voices: &[Voice], format: CatalogFormat) -> CatalogBody {
    match format {
        CatalogFormat::PluginText => CatalogBody::Text(plugin_text(voices)),
        CatalogFormat::LabelMap => {
            let map: BTreeMap<&str, String> = voices.iter().map(|v| (v.id(), v.label())).collect();
            CatalogBody::Json(serde_json::json!(map))
        }
        CatalogFormat::Full => CatalogBody::Json(serde_json::json!(voices)),
    }
}

/// Speaker enumeration in the multi-TTS plugin convention.
pub fn plugin_text(voices: &[Voice]) -> String {
    voices
        .iter()
        .map(|v| {
            format!(
                "- !!org.nobody.multitts.tts.speaker.Speaker\n  \
                 avatar: ''\n  \
                 code: {code}\n  \
                 desc: ''\n  \
                 extendUI: ''\n  \
                 gender: {gender}\n  \
                 name: {name}\n  \
                 note: 'wpm: {wpm}'\n  \
                 param: ''\n  \
                 sampleRate: {rate}\n  \
                 speed: 1.5\n  \
                 type: 1\n  \
                 volume: 1",
                code = v.short_name,
                gender = if v.is_female() { 0 } else { 1 },
                name = if v.local_name.is_empty() { &v.short_name } else { &v.local_name },
                wpm = v.words_per_minute.as_deref().unwrap_or(""),
                rate = v.sample_rate_hertz.as_deref().unwrap_or("24000"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
