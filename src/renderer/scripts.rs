//! JavaScript evaluated inside the surface. Every script is an async IIFE
//! that resolves to a plain object, with `error` set when it throws.

pub const ACTIVATE_TAG: &str = "/* surface:activate */";
pub const PROBE_TAG: &str = "/* surface:probe */";
pub const PAYLOAD_TAG: &str = "/* surface:payload */";

const ACCEPT_DOCUMENT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";
const ACCEPT_BINARY: &str = "application/zip, application/octet-stream, */*;q=0.8";

/// JSON string literal, safe to splice into a script.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Waits briefly for the service worker, then issues one throwaway fetch so it takes control.
pub fn activate(origin: &str) -> String {
    format!(
        r#"{tag}
        (async () => {{
            try {{
                if (navigator.serviceWorker) {{
                    await Promise.race([
                        navigator.serviceWorker.ready,
                        new Promise((resolve) => setTimeout(resolve, 5000)),
                    ]);
                }}
                const response = await fetch({url}, {{ credentials: 'include', cache: 'no-store' }});
                return {{
                    status: response.status,
                    controlled: !!(navigator.serviceWorker && navigator.serviceWorker.controller),
                }};
            }} catch (e) {{
                return {{ error: String(e) }};
            }}
        }})()
        "#,
        tag = ACTIVATE_TAG,
        url = js_string(&format!("{}/", origin.trim_end_matches('/'))),
    )
}

/// First, priming request. Only its metadata comes back.
pub fn probe(url: &str) -> String {
    format!(
        r#"{tag}
        (async () => {{
            try {{
                const response = await fetch({url}, {{
                    method: 'GET',
                    credentials: 'include',
                    cache: 'no-store',
                    redirect: 'follow',
                    headers: {{ 'Accept': {accept} }},
                }});
                return {{
                    status: response.status,
                    contentType: response.headers.get('content-type') || '',
                    redirected: response.redirected,
                }};
            }} catch (e) {{
                return {{ error: String(e) }};
            }}
        }})()
        "#,
        tag = PROBE_TAG,
        url = js_string(url),
        accept = js_string(ACCEPT_DOCUMENT),
    )
}

/// Second request. The whole body comes back base64-encoded.
pub fn payload(url: &str) -> String {
    format!(
        r#"{tag}
        (async () => {{
            try {{
                const response = await fetch({url}, {{
                    method: 'GET',
                    credentials: 'include',
                    cache: 'no-store',
                    redirect: 'follow',
                    headers: {{ 'Accept': {accept} }},
                }});
                const contentType = response.headers.get('content-type') || '';
                const bytes = new Uint8Array(await response.arrayBuffer());
                let binary = '';
                for (let i = 0; i < bytes.length; i += 0x8000) {{
                    binary += String.fromCharCode.apply(null, bytes.subarray(i, i + 0x8000));
                }}
                return {{
                    status: response.status,
                    contentType: contentType,
                    size: bytes.length,
                    data: btoa(binary),
                }};
            }} catch (e) {{
                return {{ error: String(e) }};
            }}
        }})()
        "#,
        tag = PAYLOAD_TAG,
        url = js_string(url),
        accept = js_string(ACCEPT_BINARY),
    )
}
