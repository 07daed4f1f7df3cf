use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::Config;

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    pub model: Option<ModelConfig>,
    pub ocr: Option<OcrConfig>,
    pub limits: Option<LimitsConfig>,
    pub ner: Option<NerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OcrConfig {
    pub dpi: Option<u32>,
    pub workers: Option<usize>,
    pub merge_gap: Option<f32>,
    pub lang: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub classifier_page_cap: Option<usize>,
    pub classifier_min_text_len: Option<usize>,
    pub max_hints_per_field: Option<usize>,
    pub max_prompt_text_len: Option<usize>,
    pub prompt_tail_len: Option<usize>,
    pub extraction_deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NerConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Platform config directory path: `<config_dir>/docsift/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("docsift").join("config.toml"))
}

/// Load config by cascading CWD `.docsift.toml` over platform config.
/// CWD values override platform values.
pub fn load_config() -> ConfigFile {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(&PathBuf::from(".docsift.toml"));

    match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    }
}

/// Load a config from a specific path. Returns `None` if the file
/// doesn't exist or can't be parsed.
pub fn load_from_path(path: &PathBuf) -> Option<ConfigFile> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content).ok()
}

/// Merge two configs: `overlay` values take precedence over `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    fn pick<T: Clone>(
        overlay: Option<&T>,
        base: Option<&T>,
    ) -> Option<T> {
        overlay.cloned().or_else(|| base.cloned())
    }

    let (bm, om) = (base.model.unwrap_or_default(), overlay.model.unwrap_or_default());
    let (bo, oo) = (base.ocr.unwrap_or_default(), overlay.ocr.unwrap_or_default());
    let (bl, ol) = (base.limits.unwrap_or_default(), overlay.limits.unwrap_or_default());
    let (bn, on) = (base.ner.unwrap_or_default(), overlay.ner.unwrap_or_default());

    ConfigFile {
        model: Some(ModelConfig {
            name: pick(om.name.as_ref(), bm.name.as_ref()),
            api_key: pick(om.api_key.as_ref(), bm.api_key.as_ref()),
            timeout_secs: pick(om.timeout_secs.as_ref(), bm.timeout_secs.as_ref()),
        }),
        ocr: Some(OcrConfig {
            dpi: pick(oo.dpi.as_ref(), bo.dpi.as_ref()),
            workers: pick(oo.workers.as_ref(), bo.workers.as_ref()),
            merge_gap: pick(oo.merge_gap.as_ref(), bo.merge_gap.as_ref()),
            lang: pick(oo.lang.as_ref(), bo.lang.as_ref()),
        }),
        limits: Some(LimitsConfig {
            classifier_page_cap: pick(ol.classifier_page_cap.as_ref(), bl.classifier_page_cap.as_ref()),
            classifier_min_text_len: pick(
                ol.classifier_min_text_len.as_ref(),
                bl.classifier_min_text_len.as_ref(),
            ),
            max_hints_per_field: pick(ol.max_hints_per_field.as_ref(), bl.max_hints_per_field.as_ref()),
            max_prompt_text_len: pick(ol.max_prompt_text_len.as_ref(), bl.max_prompt_text_len.as_ref()),
            prompt_tail_len: pick(ol.prompt_tail_len.as_ref(), bl.prompt_tail_len.as_ref()),
            extraction_deadline_secs: pick(
                ol.extraction_deadline_secs.as_ref(),
                bl.extraction_deadline_secs.as_ref(),
            ),
        }),
        ner: Some(NerConfig {
            url: pick(on.url.as_ref(), bn.url.as_ref()),
            timeout_secs: pick(on.timeout_secs.as_ref(), bn.timeout_secs.as_ref()),
        }),
    }
}

impl ConfigFile {
    /// Apply file values over a runtime [`Config`], leaving defaults
    /// for anything the file doesn't set.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(model) = &self.model {
            if let Some(name) = &model.name {
                config.model_name = name.clone();
            }
            if let Some(key) = &model.api_key {
                config.model_api_key = Some(key.clone());
            }
            if let Some(t) = model.timeout_secs {
                config.model_timeout_secs = t;
            }
        }
        if let Some(ocr) = &self.ocr {
            if let Some(dpi) = ocr.dpi {
                config.ocr_dpi = dpi;
            }
            if let Some(workers) = ocr.workers {
                config.ocr_workers = workers;
            }
            if let Some(gap) = ocr.merge_gap {
                config.ocr_merge_gap = gap;
            }
            if let Some(lang) = &ocr.lang {
                config.ocr_lang = lang.clone();
            }
        }
        if let Some(limits) = &self.limits {
            if let Some(v) = limits.classifier_page_cap {
                config.classifier_page_cap = v;
            }
            if let Some(v) = limits.classifier_min_text_len {
                config.classifier_min_text_len = v;
            }
            if let Some(v) = limits.max_hints_per_field {
                config.max_hints_per_field = v;
            }
            if let Some(v) = limits.max_prompt_text_len {
                config.max_prompt_text_len = v;
            }
            if let Some(v) = limits.prompt_tail_len {
                config.prompt_tail_len = v;
            }
            if let Some(v) = limits.extraction_deadline_secs {
                config.extraction_deadline_secs = v;
            }
        }
        if let Some(ner) = &self.ner {
            if let Some(url) = &ner.url {
                config.ner_url = Some(url.clone());
            }
            if let Some(t) = ner.timeout_secs {
                config.ner_timeout_secs = t;
            }
        }
        config
    }
}
