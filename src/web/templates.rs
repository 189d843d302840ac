//! Template loading
//!
//! Templates are embedded in the binary and compiled into one Tera instance
//! at startup. The `cdn` filter turns image URLs into CDN transformation URLs:
//!
//! ```text
//! {{ post.cover_image | cdn(w=800, h=420, format="webp", q=80) }}
//! ```

use anyhow::{Context, Result};
use axum::http::StatusCode;
use rust_embed::RustEmbed;
use std::collections::HashMap;
use tera::{Tera, Value};

use crate::config::Config;
use crate::services::media::{transform_url, CropMode, ImageFormat, ImageTransform};

/// Embedded page templates
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct TemplateAssets;

/// Template used when a page fails
const ERROR_TEMPLATE: &str = "error.html";

/// Compile every embedded template
pub fn load_templates(config: &Config) -> Result<Tera> {
    let mut templates: Vec<(String, String)> = Vec::new();
    for name in TemplateAssets::iter() {
        let file = TemplateAssets::get(&name)
            .with_context(|| format!("Embedded template disappeared: {}", name))?;
        let content = String::from_utf8(file.data.into_owned())
            .with_context(|| format!("Template is not UTF-8: {}", name))?;
        templates.push((name.to_string(), content));
    }

    // Layouts first so children resolve their parents
    templates.sort_by(|a, b| {
        let a_is_base = a.0.ends_with("base.html");
        let b_is_base = b.0.ends_with("base.html");
        b_is_base.cmp(&a_is_base).then_with(|| a.0.cmp(&b.0))
    });

    let mut tera = Tera::default();
    tera.add_raw_templates(templates)
        .context("Failed to compile templates")?;
    register_cdn_filter(&mut tera, &config.media.url_endpoint);

    tracing::debug!("Loaded {} templates", tera.get_template_names().count());
    Ok(tera)
}

/// `cdn` filter: append a transformation to URLs served by the media CDN.
///
/// Other URLs, and every URL when no endpoint is configured, pass through.
fn register_cdn_filter(tera: &mut Tera, url_endpoint: &str) {
    let endpoint = url_endpoint.trim_end_matches('/').to_string();

    tera.register_filter(
        "cdn",
        move |value: &Value, args: &HashMap<String, Value>| -> tera::Result<Value> {
            if value.is_null() {
                return Ok(Value::String(String::new()));
            }
            let url = tera::try_get_value!("cdn", "value", String, value);
            if endpoint.is_empty() || !url.starts_with(&endpoint) {
                return Ok(Value::String(url));
            }
            let transform = transform_from_args(args)?;
            Ok(Value::String(transform_url(&url, &transform)))
        },
    );
}

fn transform_from_args(args: &HashMap<String, Value>) -> tera::Result<ImageTransform> {
    let mut transform = ImageTransform::new();

    let number = |key: &str| args.get(key).and_then(Value::as_u64);
    if let Some(w) = number("w") {
        transform = transform.width(w as u32);
    }
    if let Some(h) = number("h") {
        transform = transform.height(h as u32);
    }
    if let Some(q) = number("q") {
        transform = transform.quality(q.min(100) as u8);
    }
    if let Some(format) = args.get("format").and_then(Value::as_str) {
        let format: ImageFormat = format.parse().map_err(tera::Error::msg)?;
        transform = transform.format(format);
    }
    if let Some(crop) = args.get("crop").and_then(Value::as_str) {
        let crop: CropMode = crop.parse().map_err(tera::Error::msg)?;
        transform = transform.crop(crop);
    }
    Ok(transform)
}

/// Standalone error page; never fails
pub fn render_error_page(status: StatusCode, message: &str) -> String {
    let mut context = tera::Context::new();
    context.insert("status", &status.as_u16());
    context.insert("reason", status.canonical_reason().unwrap_or("Error"));
    context.insert("message", message);

    let rendered = TemplateAssets::get(ERROR_TEMPLATE)
        .and_then(|file| String::from_utf8(file.data.into_owned()).ok())
        .and_then(|source| match Tera::one_off(&source, &context, true) {
            Ok(html) => Some(html),
            Err(e) => {
                tracing::error!("Failed to render error page: {}", e);
                None
            }
        });

    rendered.unwrap_or_else(|| format!("<h1>{}</h1>", status))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tera_with_endpoint(endpoint: &str) -> Tera {
        let mut config = Config::default();
        config.media.url_endpoint = endpoint.to_string();
        load_templates(&config).unwrap()
    }

    #[test]
    fn test_embedded_templates_compile() {
        let tera = load_templates(&Config::default()).unwrap();
        let names: Vec<&str> = tera.get_template_names().collect();
        for expected in ["base.html", "index.html", "post.html", "admin/base.html"] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_cdn_filter_transforms_cdn_urls_only() {
        let mut tera = tera_with_endpoint("https://ik.imagekit.io/demo/");
        let mut context = tera::Context::new();
        context.insert("cdn_url", "https://ik.imagekit.io/demo/blog/a.jpg");
        context.insert("other_url", "https://example.com/a.jpg");

        let html = tera
            .render_str(
                "{{ cdn_url | cdn(w=400, h=300, format=\"webp\", q=80) }} {{ other_url | cdn(w=400) }}",
                &context,
            )
            .unwrap();
        assert_eq!(
            html,
            "https://ik.imagekit.io/demo/blog/a.jpg?tr=w-400,h-300,f-webp,q-80 https://example.com/a.jpg"
        );
    }

    #[test]
    fn test_cdn_filter_rejects_unknown_format() {
        let mut tera = tera_with_endpoint("https://ik.imagekit.io/demo");
        let mut context = tera::Context::new();
        context.insert("url", "https://ik.imagekit.io/demo/a.jpg");
        assert!(tera.render_str("{{ url | cdn(format=\"bmp\") }}", &context).is_err());
    }

    #[test]
    fn test_error_page_escapes_message() {
        let html = render_error_page(StatusCode::NOT_FOUND, "<script>x</script>");
        assert!(html.contains("404"));
        assert!(!html.contains("<script>x"));
    }
}
