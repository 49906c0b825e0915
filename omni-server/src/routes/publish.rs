use axum::{
    extract::{Multipart, State},
    Json,
};
use libomnicast::service::publishing::PublishTarget;
use libomnicast::types::MediaUpload;
use serde::Deserialize;

use crate::auth::SessionUser;
use crate::error::ApiErr;
use crate::AppState;

/// Text fields and the optional file of a publish form
#[derive(Debug, Default)]
struct PublishForm {
    platform: Option<String>,
    post_type: Option<String>,
    content: String,
    page_id: Option<String>,
    platforms: Option<String>,
    media: Option<MediaUpload>,
}

async fn read_form(mut multipart: Multipart) -> Result<PublishForm, ApiErr> {
    let mut form = PublishForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiErr::bad_request(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" | "video" | "file" | "media" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiErr::bad_request(format!("Failed to read upload: {}", e)))?;
                if bytes.is_empty() {
                    continue;
                }
                if form.media.is_some() {
                    return Err(ApiErr::bad_request("Only one file can be attached"));
                }
                form.media = Some(MediaUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ApiErr::bad_request(format!("Failed to read field {}: {}", name, e)))?;
                match name.as_str() {
                    "platform" => form.platform = Some(value),
                    "postType" | "post_type" => form.post_type = Some(value),
                    "content" | "caption" => form.content = value,
                    "pageId" | "page_id" => form.page_id = Some(value),
                    "platforms" => form.platforms = Some(value),
                    other => tracing::debug!("Ignoring form field {}", other),
                }
            }
        }
    }

    Ok(form)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetInput {
    platform: String,
    #[serde(default)]
    post_type: Option<String>,
    #[serde(default)]
    page_id: Option<String>,
}

/// Parse the `platforms` field: a JSON array of targets, or of bare
/// platform names that inherit the form's `postType`
fn parse_targets(raw: &str, default_post_type: &str) -> Result<Vec<PublishTarget>, ApiErr> {
    let values: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| ApiErr::bad_request(format!("platforms must be a JSON array: {}", e)))?;

    values
        .into_iter()
        .map(|value| {
            let input = match value {
                serde_json::Value::String(platform) => TargetInput {
                    platform,
                    post_type: None,
                    page_id: None,
                },
                other => serde_json::from_value::<TargetInput>(other)
                    .map_err(|e| ApiErr::bad_request(format!("Invalid platform entry: {}", e)))?,
            };
            PublishTarget::parse(
                &input.platform,
                input.post_type.as_deref().unwrap_or(default_post_type),
                input.page_id.as_deref(),
            )
            .map_err(ApiErr::from)
        })
        .collect()
}

/// `POST /social-media/post`
pub async fn post_single(
    State(state): State<AppState>,
    user: SessionUser,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let form = read_form(multipart).await?;
    let platform = form
        .platform
        .as_deref()
        .ok_or_else(|| ApiErr::bad_request("platform is required"))?;
    let target = PublishTarget::parse(
        platform,
        form.post_type.as_deref().unwrap_or("text"),
        form.page_id.as_deref(),
    )?;

    let result = state
        .service
        .publishing()
        .post_to_single_platform(&user.tenant(), &target, &form.content, form.media)
        .await
        .map_err(|e| ApiErr::from(e).context(format!("Failed to publish to {}", target.platform)))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Published to {}", target.platform),
        "result": result,
    })))
}

/// `POST /social-media/post-all`
pub async fn post_all(
    State(state): State<AppState>,
    user: SessionUser,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiErr> {
    let form = read_form(multipart).await?;
    let raw = form
        .platforms
        .as_deref()
        .ok_or_else(|| ApiErr::bad_request("platforms is required"))?;
    let targets = parse_targets(raw, form.post_type.as_deref().unwrap_or("text"))?;

    let result = state
        .service
        .publishing()
        .post_to_all_platforms(&user.tenant(), &targets, &form.content, form.media)
        .await
        .map_err(|e| ApiErr::from(e).context("Failed to publish"))?;

    let message = format!(
        "Published to {} of {} platforms",
        result.success.len(),
        targets.len()
    );
    Ok(Json(serde_json::json!({
        "success": !result.success.is_empty(),
        "message": message,
        "result": result,
    })))
}
