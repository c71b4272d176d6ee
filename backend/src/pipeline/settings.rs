//! Pipeline settings
//!
//! Tunables for the research pipeline. Defaults come from the environment at
//! startup and can be adjusted at runtime through `/api/config`. Each session
//! takes a snapshot when it starts, so an update never changes a running
//! session halfway through.

use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// Upper bound for `max_research_tasks`
pub const MAX_RESEARCH_TASKS_LIMIT: usize = 10;
/// Upper bound for `max_search_results`
pub const MAX_SEARCH_RESULTS_LIMIT: usize = 20;
/// Upper bound for `max_visuals`
pub const MAX_VISUALS_LIMIT: usize = 8;

/// Pipeline settings
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PipelineSettings {
    /// Chat model used by the analyze, plan, research, visualize and evaluate stages
    pub llm_model: String,
    /// Model used to describe image attachments
    pub vision_model: String,
    /// Model used to render visuals
    pub image_model: String,
    /// Size of rendered visuals (e.g. "1024x1024")
    pub image_size: String,
    /// Per-stage timeout in seconds
    pub stage_timeout_secs: u64,
    /// Maximum number of research tasks taken from the plan
    pub max_research_tasks: usize,
    /// Maximum number of search hits per research task
    pub max_search_results: usize,
    /// Maximum number of visuals rendered per report
    pub max_visuals: usize,
    /// Maximum query length in characters
    pub max_query_length: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            llm_model: "gpt-4o".to_string(),
            vision_model: "gpt-4o".to_string(),
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            stage_timeout_secs: 180,
            max_research_tasks: 4,
            max_search_results: 5,
            max_visuals: 2,
            max_query_length: 10_000, // 10KB
        }
    }
}

/// Request body for updating pipeline settings
#[derive(Debug, Default, Deserialize)]
pub struct SettingsUpdateRequest {
    /// Chat model name (optional)
    pub llm_model: Option<String>,
    /// Vision model name (optional)
    pub vision_model: Option<String>,
    /// Image generation model name (optional)
    pub image_model: Option<String>,
    /// Per-stage timeout in seconds (optional)
    pub stage_timeout_secs: Option<u64>,
    /// Maximum number of research tasks (optional)
    pub max_research_tasks: Option<usize>,
    /// Maximum number of search hits per task (optional)
    pub max_search_results: Option<usize>,
    /// Maximum number of visuals (optional)
    pub max_visuals: Option<usize>,
    /// Maximum query length in characters (optional)
    pub max_query_length: Option<usize>,
}

/// Validate and apply settings updates
///
/// All fields are validated before anything is applied; an invalid field
/// rejects the whole update.
///
/// # Arguments
/// * `settings` - The current settings to update
/// * `request` - The update request with optional fields
///
/// # Returns
/// * `Ok(PipelineSettings)` - The updated settings
/// * `Err(AppError)` - If validation fails
pub fn validate_and_apply_settings_update(
    mut settings: PipelineSettings,
    request: SettingsUpdateRequest,
) -> Result<PipelineSettings, AppError> {
    for (name, model) in [
        ("llm_model", &request.llm_model),
        ("vision_model", &request.vision_model),
        ("image_model", &request.image_model),
    ] {
        if matches!(model, Some(m) if m.trim().is_empty()) {
            return Err(AppError::InvalidConfig(format!("{} cannot be empty", name)));
        }
    }

    if request.stage_timeout_secs == Some(0) {
        return Err(AppError::InvalidConfig(
            "stage_timeout_secs must be > 0".to_string(),
        ));
    }
    if let Some(tasks) = request.max_research_tasks {
        if tasks == 0 || tasks > MAX_RESEARCH_TASKS_LIMIT {
            return Err(AppError::InvalidConfig(format!(
                "max_research_tasks must be between 1 and {}",
                MAX_RESEARCH_TASKS_LIMIT
            )));
        }
    }
    if let Some(results) = request.max_search_results {
        if results == 0 || results > MAX_SEARCH_RESULTS_LIMIT {
            return Err(AppError::InvalidConfig(format!(
                "max_search_results must be between 1 and {}",
                MAX_SEARCH_RESULTS_LIMIT
            )));
        }
    }
    if matches!(request.max_visuals, Some(v) if v > MAX_VISUALS_LIMIT) {
        return Err(AppError::InvalidConfig(format!(
            "max_visuals must be at most {}",
            MAX_VISUALS_LIMIT
        )));
    }
    if request.max_query_length == Some(0) {
        return Err(AppError::InvalidConfig(
            "max_query_length must be > 0".to_string(),
        ));
    }

    if let Some(model) = request.llm_model {
        settings.llm_model = model;
    }
    if let Some(model) = request.vision_model {
        settings.vision_model = model;
    }
    if let Some(model) = request.image_model {
        settings.image_model = model;
    }
    if let Some(timeout) = request.stage_timeout_secs {
        settings.stage_timeout_secs = timeout;
    }
    if let Some(tasks) = request.max_research_tasks {
        settings.max_research_tasks = tasks;
    }
    if let Some(results) = request.max_search_results {
        settings.max_search_results = results;
    }
    if let Some(visuals) = request.max_visuals {
        settings.max_visuals = visuals;
    }
    if let Some(length) = request.max_query_length {
        settings.max_query_length = length;
    }

    Ok(settings)
}

impl From<&PipelineSettings> for SettingsUpdateRequest {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            llm_model: Some(settings.llm_model.clone()),
            vision_model: Some(settings.vision_model.clone()),
            image_model: Some(settings.image_model.clone()),
            stage_timeout_secs: Some(settings.stage_timeout_secs),
            max_research_tasks: Some(settings.max_research_tasks),
            max_search_results: Some(settings.max_search_results),
            max_visuals: Some(settings.max_visuals),
            max_query_length: Some(settings.max_query_length),
        }
    }
}

/// Validate a complete set of settings with the same rules as an update
pub fn validate_settings(settings: &PipelineSettings) -> Result<(), AppError> {
    validate_and_apply_settings_update(settings.clone(), SettingsUpdateRequest::from(settings))
        .map(|_| ())
}
