use std::io::Cursor;

use rocket::http::ContentType;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{response, Request, Response};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};
use utoipa::ToSchema;

/// Implements [RFC7807](https://tools.ietf.org/html/rfc7807).
///
/// `code` is the stable, machine readable part of every problem. Titles and
/// details are for humans and may change.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Problem {
    #[serde(skip)]
    pub status: Status,
    pub code: String,
    pub type_uri: String,
    pub title: String,

    pub detail: Option<String>,
    pub instance_uri: Option<String>,

    #[schema(value_type = Object)]
    pub body: Map<String, Value>,
}

impl Default for Problem {
    fn default() -> Self {
        Problem {
            status: Status::InternalServerError,
            code: "internal".to_string(),
            type_uri: "about:blank".to_string(),
            title: "Problem".to_string(),
            detail: None,
            instance_uri: None,
            body: Map::new(),
        }
    }
}

impl Problem {
    pub fn new(status: Status, code: impl ToString, title: impl ToString) -> Problem {
        Problem {
            status,
            code: code.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn detail(&mut self, value: impl ToString) -> &mut Problem {
        self.detail = Some(value.to_string());
        self
    }

    pub fn instance_uri(&mut self, value: String) -> &mut Problem {
        self.instance_uri = Some(value);
        self
    }

    pub fn insert<V: Serialize>(&mut self, key: impl ToString, value: V) -> &mut Problem {
        self.body.insert(
            key.to_string(),
            serde_json::to_value(value).unwrap_or(Value::Null),
        );
        self
    }

    pub fn insert_str(&mut self, key: impl ToString, value: impl ToString) -> &mut Problem {
        self.body
            .insert(key.to_string(), Value::String(value.to_string()));
        self
    }

    /// Whether a client may repeat the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        self.status == Status::ServiceUnavailable
    }

    pub fn to_json(&self) -> Map<String, Value> {
        let mut body = self.body.clone();

        // Following are required by rfc7807
        body.insert(String::from("type"), Value::from(self.type_uri.clone()));
        body.insert(String::from("title"), Value::from(self.title.clone()));

        // Optional parameters as specified by rfc7807
        if let Some(detail) = &self.detail {
            body.insert(String::from("detail"), Value::from(detail.clone()));
        }
        body.insert(String::from("status"), Value::from(self.status.code));
        if let Some(instance) = &self.instance_uri {
            body.insert(String::from("instance"), Value::from(instance.clone()));
        }

        body.insert(String::from("code"), Value::from(self.code.clone()));
        if self.is_retryable() {
            body.insert(String::from("retryable"), Value::Bool(true));
        }

        body
    }
}

impl Display for Problem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.status, self.code, self.title)
    }
}

impl std::error::Error for Problem {}

impl<'r> Responder<'r, 'static> for Problem {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body_string = Value::Object(self.to_json()).to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::new("application", "problem+json"))
            .raw_header("Content-Language", "en")
            .sized_body(body_string.len(), Cursor::new(body_string))
            .ok()
    }
}

/// Problem left behind by a failing request guard.
///
/// Rocket 0.5 hands guard errors to nobody, so guards stash theirs in the
/// request-local cache and [`problem_catcher`] renders it.
#[derive(Debug, Clone, Default)]
pub struct GuardProblem(pub Option<Problem>);

pub fn stash(req: &Request<'_>, problem: Problem) -> (Status, Problem) {
    let cached = req.local_cache(|| GuardProblem(Some(problem.clone())));
    match &cached.0 {
        Some(first) => (first.status, first.clone()),
        None => (problem.status, problem),
    }
}

#[catch(default)]
pub fn problem_catcher(status: Status, req: &Request<'_>) -> Problem {
    if let Some(problem) = &req.local_cache(|| GuardProblem(None)).0 {
        return problem.clone();
    }

    match status.code {
        400 | 422 => problems::invalid_input("The request body or parameters couldn't be parsed."),
        401 => problems::unauthenticated("missing_token", "No valid credentials were provided."),
        403 => problems::forbidden(),
        404 => Problem::new(Status::NotFound, "not_found", "Resource not found."),
        _ => Problem::new(
            status,
            "internal",
            status.reason().unwrap_or("Unexpected server error."),
        ),
    }
}

pub mod problems {
    use crate::resp::problem::Problem;
    use rocket::http::Status;

    #[inline]
    pub fn invalid_input(detail: impl ToString) -> Problem {
        Problem::new(Status::BadRequest, "invalid_input", "Invalid input.")
            .detail(detail)
            .to_owned()
    }

    #[inline]
    pub fn invalid_id(what: &str, value: impl ToString) -> Problem {
        invalid_input(format!("'{}' is not a valid {} ID.", value.to_string(), what))
            .insert_str("field", what)
            .to_owned()
    }

    #[inline]
    pub fn unauthenticated(reason: &str, detail: impl ToString) -> Problem {
        Problem::new(
            Status::Unauthorized,
            "unauthenticated",
            "Unable to authenticate request.",
        )
        .insert_str("reason", reason)
        .detail(detail)
        .to_owned()
    }

    #[inline]
    pub fn forbidden() -> Problem {
        Problem::new(
            Status::Forbidden,
            "forbidden",
            "Insufficient permissions for this operation.",
        )
    }

    #[inline]
    pub fn not_found(what: &str, id: impl ToString) -> Problem {
        Problem::new(Status::NotFound, "not_found", format!("{} doesn't exist.", what))
            .insert_str("id", id)
            .to_owned()
    }

    #[inline]
    pub fn conflict(code: &str, title: impl ToString) -> Problem {
        Problem::new(Status::Conflict, code, title)
    }

    #[inline]
    pub fn duplicate(field: impl ToString) -> Problem {
        Problem::new(Status::Conflict, "duplicate", "Value is already in use.")
            .insert_str("field", field)
            .to_owned()
    }

    #[inline]
    pub fn store_unavailable(detail: impl ToString) -> Problem {
        Problem::new(
            Status::ServiceUnavailable,
            "store_unavailable",
            "The data store didn't respond in time. Retry the request.",
        )
        .detail(detail)
        .to_owned()
    }

    #[inline]
    pub fn internal(title: impl ToString) -> Problem {
        Problem::new(Status::InternalServerError, "internal", title)
    }
}
