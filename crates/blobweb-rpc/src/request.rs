use serde_json::{Map, Value};

use crate::error::{RpcError, RpcResult};

/// A file part from a multipart request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadedFile {
    /// Client-supplied name, unsanitized.
    pub filename: String,
    pub data: Vec<u8>,
}

/// A parsed RPC call.
///
/// `funcname` is kept as raw JSON so a non-string name can be reported to
/// the caller rather than rejected as malformed.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcRequest {
    pub funcname: Value,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
    pub upload: Option<UploadedFile>,
}

impl RpcRequest {
    pub fn new(funcname: impl Into<String>) -> Self {
        Self {
            funcname: Value::String(funcname.into()),
            args: Vec::new(),
            kwargs: Map::new(),
            upload: None,
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn with_upload(mut self, upload: UploadedFile) -> Self {
        self.upload = Some(upload);
        self
    }

    /// The name, if it is a string.
    pub fn name(&self) -> Option<&str> {
        self.funcname.as_str()
    }

    /// Parse a `{"funcname", "args", "kwargs"}` JSON body.
    ///
    /// A body that is not a JSON object, or has `args`/`kwargs` of the
    /// wrong shape, is a `BadRequest`. Missing `args`/`kwargs` are empty.
    pub fn from_json_body(body: &[u8]) -> RpcResult<Self> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| RpcError::BadRequest(format!("request body is not JSON: {e}")))?;
        let Value::Object(mut map) = value else {
            return Err(RpcError::BadRequest("request body must be a JSON object".into()));
        };

        let funcname = map.remove("funcname").unwrap_or(Value::Null);
        let args = match map.remove("args") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(args)) => args,
            Some(other) => {
                return Err(RpcError::BadRequest(format!("args must be a list, got {other}")))
            }
        };
        let kwargs = match map.remove("kwargs") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(kwargs)) => kwargs,
            Some(other) => {
                return Err(RpcError::BadRequest(format!("kwargs must be an object, got {other}")))
            }
        };

        Ok(Self {
            funcname,
            args,
            kwargs,
            upload: None,
        })
    }

    /// Build a call from multipart form fields.
    ///
    /// `args` and `kwargs` are JSON-encoded strings; either one that fails
    /// to parse (or has the wrong shape) is treated as empty.
    pub fn from_form(
        funcname: Option<String>,
        args: Option<&str>,
        kwargs: Option<&str>,
        upload: Option<UploadedFile>,
    ) -> Self {
        let args = args
            .and_then(|raw| serde_json::from_str::<Vec<Value>>(raw).ok())
            .unwrap_or_default();
        let kwargs = kwargs
            .and_then(|raw| serde_json::from_str::<Map<String, Value>>(raw).ok())
            .unwrap_or_default();
        Self {
            funcname: funcname.map(Value::String).unwrap_or(Value::Null),
            args,
            kwargs,
            upload,
        }
    }

    /// One-line description for exception reports.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "funcname={} args={} kwargs={}",
            self.funcname,
            Value::Array(self.args.clone()),
            Value::Object(self.kwargs.clone())
        );
        if let Some(upload) = &self.upload {
            summary.push_str(&format!(
                " upload={:?} ({} bytes)",
                upload.filename,
                upload.data.len()
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body() {
        let req = RpcRequest::from_json_body(
            br#"{"funcname":"add","args":[1,2],"kwargs":{"z":1,"a":2}}"#,
        )
        .unwrap();
        assert_eq!(req.name(), Some("add"));
        assert_eq!(req.args, vec![json!(1), json!(2)]);
        let order: Vec<&String> = req.kwargs.keys().collect();
        assert_eq!(order, ["z", "a"]);
    }

    #[test]
    fn json_body_defaults() {
        let req = RpcRequest::from_json_body(br#"{"funcname":"ping"}"#).unwrap();
        assert!(req.args.is_empty());
        assert!(req.kwargs.is_empty());

        let req = RpcRequest::from_json_body(br#"{"funcname":7}"#).unwrap();
        assert_eq!(req.name(), None);
        assert_eq!(req.funcname, json!(7));
    }

    #[test]
    fn malformed_json_is_bad_request() {
        let bodies: [&[u8]; 3] = [b"not json", b"[1,2]", br#"{"funcname":"x","args":{}}"#];
        for body in bodies {
            let err = RpcRequest::from_json_body(body).unwrap_err();
            assert!(matches!(err, RpcError::BadRequest(_)), "{body:?}");
        }
    }

    #[test]
    fn form_fields_are_lenient() {
        let req = RpcRequest::from_form(Some("up".into()), Some("not json"), Some("[1]"), None);
        assert_eq!(req.name(), Some("up"));
        assert!(req.args.is_empty());
        assert!(req.kwargs.is_empty());

        let req = RpcRequest::from_form(Some("up".into()), Some("[\"a\"]"), Some("{\"k\":1}"), None);
        assert_eq!(req.args, vec![json!("a")]);
        assert_eq!(req.kwargs.get("k"), Some(&json!(1)));
    }

    #[test]
    fn summary_mentions_upload() {
        let req = RpcRequest::new("up").with_upload(UploadedFile {
            filename: "data.csv".into(),
            data: vec![0; 4],
        });
        let summary = req.summary();
        assert!(summary.contains("\"up\""));
        assert!(summary.contains("data.csv"));
        assert!(summary.contains("4 bytes"));
    }
}
