use crate::{
    EnvMeta, GatewayApi, GatewayConfig, RegisterEnvironment, RegisterResponse, RegistrationResult,
    RemoteError, ReuseCheckRequest, ReuseDecision, UploadPackageRequest,
};
use envpack_schema::ProjectId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;

/// HTTP gateway client.
///
/// Endpoints, relative to the configured base URL:
/// - `GET  /env/meta?projectId&name&level`
/// - `POST /env/reusable-check`
/// - `POST /env/environments`
/// - `POST /env/environment-packages/upload`
/// - `GET  /env/<projectId>/environments/check-name?name&manifestText`
pub struct HttpGateway {
    config: GatewayConfig,
    agent: ureq::Agent,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let agent = ureq::Agent::new_with_defaults();
        Self { config, agent }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.url)
    }

    fn decorate<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        let mut req = req
            .header("Content-Type", "application/json")
            .header("X-Envpack-Protocol", &crate::PROTOCOL_VERSION.to_string());
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        if let Some(ref operator) = self.config.operator_id {
            req = req.header("Operator", operator);
        }
        req
    }

    fn read_body(url: &str, resp: ureq::http::Response<ureq::Body>) -> Result<Vec<u8>, RemoteError> {
        let code = resp.status().as_u16();
        if code >= 400 {
            return Err(RemoteError::Transport(format!("HTTP {code} for {url}")));
        }
        let mut reader = resp.into_body().into_reader();
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok(body)
    }

    fn map_err(url: &str, err: ureq::Error) -> RemoteError {
        match err {
            ureq::Error::StatusCode(404) => RemoteError::NotFound(url.to_owned()),
            ureq::Error::StatusCode(code) => {
                RemoteError::Transport(format!("HTTP {code} for {url}"))
            }
            other => RemoteError::Transport(other.to_string()),
        }
    }

    fn do_get(&self, path: &str, query: &[(&str, &str)]) -> Result<Vec<u8>, RemoteError> {
        let url = self.url(path);
        tracing::debug!("GET {url}");
        let mut req = self.decorate(self.agent.get(&url));
        for (k, v) in query {
            req = req.query(*k, *v);
        }
        let resp = req.call().map_err(|e| Self::map_err(&url, e))?;
        Self::read_body(&url, resp)
    }

    fn do_post<T: Serialize>(&self, path: &str, payload: &T) -> Result<Vec<u8>, RemoteError> {
        let url = self.url(path);
        let body =
            serde_json::to_vec(payload).map_err(|e| RemoteError::Serialization(e.to_string()))?;
        tracing::debug!("POST {url} ({} bytes)", body.len());
        let resp = self
            .decorate(self.agent.post(&url))
            .send(&body[..])
            .map_err(|e| Self::map_err(&url, e))?;
        Self::read_body(&url, resp)
    }

    fn decode<T: DeserializeOwned>(path: &str, body: &[u8]) -> Result<T, RemoteError> {
        serde_json::from_slice(body)
            .map_err(|e| RemoteError::Serialization(format!("invalid response from {path}: {e}")))
    }
}

impl GatewayApi for HttpGateway {
    fn env_meta(
        &self,
        project: &ProjectId,
        name: &str,
        level: u32,
    ) -> Result<EnvMeta, RemoteError> {
        let level = level.to_string();
        let body = self.do_get(
            "/env/meta",
            &[("projectId", project.as_str()), ("name", name), ("level", &level)],
        )?;
        Self::decode("/env/meta", &body)
    }

    fn reusable_check(&self, request: &ReuseCheckRequest) -> Result<ReuseDecision, RemoteError> {
        let body = self.do_post("/env/reusable-check", request)?;
        Self::decode("/env/reusable-check", &body)
    }

    fn register_environment(
        &self,
        request: &RegisterEnvironment,
    ) -> Result<RegisterResponse, RemoteError> {
        let body = self.do_post("/env/environments", request)?;
        Self::decode("/env/environments", &body)
    }

    fn upload_package(
        &self,
        request: &UploadPackageRequest,
    ) -> Result<RegistrationResult, RemoteError> {
        let body = self.do_post("/env/environment-packages/upload", request)?;
        Self::decode("/env/environment-packages/upload", &body)
    }

    fn check_name(
        &self,
        project: &ProjectId,
        name: &str,
        manifest_text: &str,
    ) -> Result<String, RemoteError> {
        let path = format!("/env/{project}/environments/check-name");
        let body = self.do_get(&path, &[("name", name), ("manifestText", manifest_text)])?;
        // The answer is documented as a string; accept both a JSON string and
        // a bare text body.
        let text = String::from_utf8_lossy(&body);
        Ok(serde_json::from_str::<String>(&text).unwrap_or_else(|_| text.trim().to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    /// A captured HTTP request for header and body inspection.
    #[derive(Debug, Clone)]
    struct CapturedRequest {
        method: String,
        path: String,
        headers: HashMap<String, String>,
        body: Vec<u8>,
    }

    /// Canned response keyed by path prefix (query string stripped).
    struct Route {
        prefix: &'static str,
        status: u16,
        body: String,
    }

    struct MockServer {
        addr: String,
        _handle: std::thread::JoinHandle<()>,
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    impl MockServer {
        fn start(routes: Vec<Route>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = format!("http://{}", listener.local_addr().unwrap());
            let routes = Arc::new(routes);
            let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));

            let requests_clone = Arc::clone(&requests);
            let handle = std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let routes = Arc::clone(&routes);
                    let reqs = Arc::clone(&requests_clone);

                    std::thread::spawn(move || {
                        let mut reader = BufReader::new(stream.try_clone().unwrap());
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).is_err() {
                            return;
                        }
                        let parts: Vec<&str> = request_line.trim().splitn(3, ' ').collect();
                        if parts.len() < 2 {
                            return;
                        }
                        let method = parts[0].to_owned();
                        let path = parts[1].to_owned();

                        let mut content_length: usize = 0;
                        let mut headers = HashMap::new();
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
                                break;
                            }
                            if let Some((k, v)) = line.trim().split_once(": ") {
                                headers.insert(k.to_lowercase(), v.to_owned());
                            }
                            let lower = line.to_lowercase();
                            if let Some(val) = lower.strip_prefix("content-length: ") {
                                content_length = val.trim().parse().unwrap_or(0);
                            }
                        }

                        let mut body = vec![0u8; content_length];
                        if content_length > 0 {
                            let _ = reader.read_exact(&mut body);
                        }

                        reqs.lock().unwrap().push(CapturedRequest {
                            method,
                            path: path.clone(),
                            headers,
                            body,
                        });

                        let bare = path.split('?').next().unwrap_or_default();
                        let response = match routes.iter().find(|r| bare.starts_with(r.prefix)) {
                            Some(route) => format!(
                                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                route.status,
                                route.body.len(),
                                route.body
                            ),
                            None => "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                                .to_owned(),
                        };
                        let _ = stream.write_all(response.as_bytes());
                        let _ = stream.flush();
                    });
                }
            });

            MockServer {
                addr,
                _handle: handle,
                requests,
            }
        }

        fn captured_requests(&self) -> Vec<CapturedRequest> {
            // Allow the handler threads to record their request.
            std::thread::sleep(std::time::Duration::from_millis(50));
            self.requests.lock().unwrap().clone()
        }
    }

    fn route(prefix: &'static str, status: u16, body: &str) -> Route {
        Route {
            prefix,
            status,
            body: body.to_owned(),
        }
    }

    fn gateway(url: &str) -> HttpGateway {
        HttpGateway::new(GatewayConfig::new(url))
    }

    #[test]
    fn reusable_check_posts_manifest_and_decodes_answer() {
        let server = MockServer::start(vec![route(
            "/env/reusable-check",
            200,
            r#"{"exists":true,"environmentDirectory":"/dsp/env/x.tar.gz","envName":"x"}"#,
        )]);
        let gw = gateway(&server.addr);
        let decision = gw
            .reusable_check(&ReuseCheckRequest {
                project_id: ProjectId::new("7"),
                manifest_text: "dependencies:\n  - a\nprefix: /p\n".to_owned(),
            })
            .unwrap();
        assert!(decision.is_reusable());
        assert_eq!(decision.artifact_path, "/dsp/env/x.tar.gz");

        let reqs = server.captured_requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].method, "POST");
        let sent: serde_json::Value = serde_json::from_slice(&reqs[0].body).unwrap();
        assert_eq!(sent["projectId"], "7");
        assert!(sent["manifestText"].as_str().unwrap().contains("- a"));
    }

    #[test]
    fn env_meta_sends_query_parameters() {
        let server = MockServer::start(vec![route(
            "/env/meta",
            200,
            r#"{"id":3,"hdfsPath":"hdfs://ms-dwh/dsp/python_env_resource/pri_7_a.tar.gz","level":1}"#,
        )]);
        let gw = gateway(&server.addr);
        let meta = gw.env_meta(&ProjectId::new("7"), "a", 1).unwrap();
        assert_eq!(meta.id, 3);
        assert!(meta.hdfs_path.ends_with("pri_7_a.tar.gz"));

        let reqs = server.captured_requests();
        assert!(reqs[0].path.contains("projectId=7"));
        assert!(reqs[0].path.contains("name=a"));
        assert!(reqs[0].path.contains("level=1"));
    }

    #[test]
    fn upload_package_failed_status_is_returned_not_raised() {
        let server = MockServer::start(vec![route(
            "/env/environment-packages/upload",
            200,
            r#"{"status":"failed","message":"duplicate name"}"#,
        )]);
        let gw = gateway(&server.addr);
        let result = gw
            .upload_package(&UploadPackageRequest {
                project_id: ProjectId::new("7"),
                name: "pri_7_a.tar.gz".to_owned(),
                src_path: "hdfs://ms-dwh/tmp/j_pri_7_a.tar.gz".to_owned(),
                target_path: "/dsp/python_env_resource/pri_7_a.tar.gz".to_owned(),
            })
            .unwrap();
        assert_eq!(result.status, crate::RegistrationStatus::Failed);
        assert_eq!(result.message, "duplicate name");
    }

    #[test]
    fn check_name_accepts_json_and_plain_bodies() {
        let server = MockServer::start(vec![route(
            "/env/7/environments/check-name",
            200,
            "\"other-env\"",
        )]);
        let gw = gateway(&server.addr);
        let answer = gw
            .check_name(&ProjectId::new("7"), "mine", "dependencies:")
            .unwrap();
        assert_eq!(answer, "other-env");

        let plain = MockServer::start(vec![route("/env/7/environments/check-name", 200, "")]);
        let gw = gateway(&plain.addr);
        let answer = gw.check_name(&ProjectId::new("7"), "mine", "").unwrap();
        assert!(answer.is_empty());
    }

    #[test]
    fn server_error_maps_to_transport() {
        let server = MockServer::start(vec![route("/env/environments", 500, "{}")]);
        let gw = gateway(&server.addr);
        let err = gw
            .register_environment(&RegisterEnvironment {
                project_id: ProjectId::new("7"),
                name: "a".to_owned(),
                remote_path: "/p".to_owned(),
                manifest_text: String::new(),
                created_by: "alice".to_owned(),
                level: 1,
                python_version: "3.8.0".to_owned(),
            })
            .unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)), "{err}");
    }

    #[test]
    fn missing_route_maps_to_not_found() {
        let server = MockServer::start(vec![]);
        let gw = gateway(&server.addr);
        let err = gw.env_meta(&ProjectId::new("7"), "a", 1).unwrap_err();
        assert!(matches!(err, RemoteError::NotFound(_)), "{err}");
    }

    #[test]
    fn undecodable_body_maps_to_serialization() {
        let server = MockServer::start(vec![route("/env/reusable-check", 200, "<html>")]);
        let gw = gateway(&server.addr);
        let err = gw
            .reusable_check(&ReuseCheckRequest {
                project_id: ProjectId::new("7"),
                manifest_text: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, RemoteError::Serialization(_)), "{err}");
    }

    #[test]
    fn connection_refused_returns_transport_error() {
        let gw = gateway("http://127.0.0.1:1");
        let err = gw.env_meta(&ProjectId::new("7"), "a", 1).unwrap_err();
        assert!(matches!(err, RemoteError::Transport(_)), "{err}");
    }

    #[test]
    fn credentials_and_protocol_headers_are_sent() {
        let server = MockServer::start(vec![route("/env/meta", 200, r#"{"hdfsPath":"/p"}"#)]);
        let gw = HttpGateway::new(
            GatewayConfig::new(&server.addr)
                .with_token("secret-token-42")
                .with_operator("ops@example.com"),
        );
        gw.env_meta(&ProjectId::new("7"), "a", 1).unwrap();

        let reqs = server.captured_requests();
        let headers = &reqs[0].headers;
        assert_eq!(
            headers.get("authorization"),
            Some(&"Bearer secret-token-42".to_owned())
        );
        assert_eq!(headers.get("operator"), Some(&"ops@example.com".to_owned()));
        assert_eq!(headers.get("x-envpack-protocol"), Some(&"1".to_owned()));
    }

    #[test]
    fn no_auth_header_without_token() {
        let server = MockServer::start(vec![route("/env/meta", 200, r#"{"hdfsPath":"/p"}"#)]);
        let gw = gateway(&server.addr);
        gw.env_meta(&ProjectId::new("7"), "a", 1).unwrap();

        let reqs = server.captured_requests();
        assert!(!reqs[0].headers.contains_key("authorization"));
        assert!(!reqs[0].headers.contains_key("operator"));
    }
}
