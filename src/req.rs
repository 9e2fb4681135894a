//! Blocking HTTP plumbing shared by the ACME client and the DigiCert REST provider.
use std::time::Duration;

use crate::api::ApiProblem;
use crate::{Error, Result};

/// Client level timeout for every outbound call.
pub(crate) const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("certkeeper/", env!("CARGO_PKG_VERSION"));

pub(crate) type ReqResult = std::result::Result<ureq::Response, ureq::Error>;

pub(crate) fn new_agent() -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
}

pub(crate) fn req_get(agent: &ureq::Agent, url: &str) -> ReqResult {
    let req = agent.get(url);
    trace!("{:?}", req);
    req.call()
}

pub(crate) fn req_head(agent: &ureq::Agent, url: &str) -> ReqResult {
    let req = agent.head(url);
    trace!("{:?}", req);
    req.call()
}

pub(crate) fn req_post(agent: &ureq::Agent, url: &str, body: &str) -> ReqResult {
    let req = agent.post(url).set("content-type", "application/jose+json");
    trace!("{:?} {}", req, body);
    req.send_string(body)
}

/// Turn a ureq outcome into our error model.
///
/// `application/problem+json` bodies become [`Error::Api`], any other
/// non-2xx status becomes [`Error::Network`] carrying status and body.
pub(crate) fn req_handle_error(res: ReqResult) -> Result<ureq::Response> {
    match res {
        // ok responses pass through
        Ok(res) => Ok(res),
        Err(ureq::Error::Status(status, res)) => {
            let is_problem = res.content_type() == "application/problem+json";
            let status_text = res.status_text().to_string();
            let body = req_safe_read_body(res);
            if is_problem {
                // if we were sent a problem+json, deserialize it
                let problem = serde_json::from_str(&body).unwrap_or_else(|e| ApiProblem {
                    _type: "problemJsonFail".into(),
                    detail: Some(format!(
                        "Failed to deserialize application/problem+json ({}) body: {}",
                        e, body
                    )),
                    subproblems: None,
                });
                Err(Error::Api(problem))
            } else {
                // some other problem
                Err(Error::network(status, format!("{} {}", status_text, body)))
            }
        }
        Err(ureq::Error::Transport(t)) => Err(Error::Network {
            status: None,
            detail: t.to_string(),
        }),
    }
}

/// Status and body, without treating non-2xx as an error.
///
/// Used where the caller checks for one exact status code.
pub(crate) fn req_status_body(res: ReqResult) -> Result<(u16, String)> {
    match res {
        Ok(res) => {
            let status = res.status();
            Ok((status, req_safe_read_body(res)))
        }
        Err(ureq::Error::Status(status, res)) => Ok((status, req_safe_read_body(res))),
        Err(ureq::Error::Transport(t)) => Err(Error::Network {
            status: None,
            detail: t.to_string(),
        }),
    }
}

pub(crate) fn req_expect_header(res: &ureq::Response, name: &str) -> Result<String> {
    res.header(name).map(|s| s.to_string()).ok_or_else(|| {
        Error::Api(ApiProblem {
            _type: format!("Missing header: {}", name),
            detail: None,
            subproblems: None,
        })
    })
}

pub(crate) fn req_safe_read_body(res: ureq::Response) -> String {
    // letsencrypt sometimes closes the TLS abruptly causing io error
    // even though we did capture the body.
    res.into_string().unwrap_or_default()
}
