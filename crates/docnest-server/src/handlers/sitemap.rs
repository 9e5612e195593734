use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};

use crate::error::AppError;
use crate::routes::AppState;

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// GET /robots.txt
pub async fn robots_txt(State(state): State<AppState>) -> Response {
    let body = format!(
        "User-agent: *\nDisallow: /api/\nAllow: /\n\nSitemap: {}/sitemap.xml\n",
        state.config.base_url
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

/// GET /sitemap.xml
pub async fn sitemap(State(state): State<AppState>) -> Result<Response, AppError> {
    let docs = state.tree.public_docs().await?;

    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">",
    );
    for doc in docs {
        xml.push_str(&format!(
            "<url><loc>{}{}</loc><lastmod>{}</lastmod></url>",
            xml_escape(&state.config.base_url),
            xml_escape(&doc.urlpath),
            doc.updated_at.format("%Y-%m-%dT%H:%M:%S+00:00"),
        ));
    }
    xml.push_str("</urlset>");

    Ok(([(header::CONTENT_TYPE, "application/xml; charset=utf-8")], xml).into_response())
}
