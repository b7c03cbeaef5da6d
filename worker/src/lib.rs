use communitree_core::gateway::{upstream_url, ORNAMENTS_PATH};
use wasm_bindgen::JsValue;
use worker::*;

const UPSTREAM_VAR: &str = "ORNAMENTS_UPSTREAM_URL";
const JSON_CONTENT_TYPE: &str = "application/json";

#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    if req.path() != ORNAMENTS_PATH {
        return Response::error("not found", 404);
    }
    match req.method() {
        Method::Get | Method::Post | Method::Delete => forward(req, &env).await,
        _ => Response::error("method not allowed", 405),
    }
}

fn upstream_base(env: &Env) -> Option<String> {
    env.var(UPSTREAM_VAR)
        .ok()
        .map(|value| value.to_string())
        .filter(|value| !value.trim().is_empty())
}

/// Relays the request as-is. The upstream body is returned with status 200
/// whatever the upstream status was.
async fn forward(mut req: Request, env: &Env) -> Result<Response> {
    let Some(base) = upstream_base(env) else {
        console_error!("{} is not configured", UPSTREAM_VAR);
        return json_error("upstream not configured", 500);
    };
    let url = req.url()?;
    let target = upstream_url(&base, url.query());

    let method = req.method();
    let mut headers = Headers::new();
    if let Some(content_type) = req.headers().get("Content-Type")? {
        headers.set("Content-Type", &content_type)?;
    }
    let mut init = RequestInit::new();
    init.with_method(method.clone()).with_headers(headers);
    if method != Method::Get {
        let body = req.text().await?;
        if !body.is_empty() {
            init.with_body(Some(JsValue::from_str(&body)));
        }
    }

    let upstream = Request::new_with_init(&target, &init)?;
    let mut response = match Fetch::Request(upstream).send().await {
        Ok(response) => response,
        Err(err) => {
            console_error!("upstream {:?} {} failed: {}", method, ORNAMENTS_PATH, err);
            return json_error(&format!("upstream unreachable: {err}"), 502);
        }
    };
    if response.status_code() >= 400 {
        console_log!(
            "upstream {:?} {} answered {}",
            method,
            ORNAMENTS_PATH,
            response.status_code()
        );
    }
    let body = response.text().await?;

    let mut headers = Headers::new();
    headers.set("Content-Type", JSON_CONTENT_TYPE)?;
    headers.set("Cache-Control", "no-store")?;
    Ok(Response::ok(body)?.with_headers(headers))
}

fn json_error(message: &str, status: u16) -> Result<Response> {
    Ok(Response::from_json(&serde_json::json!({ "error": message }))?.with_status(status))
}
