//! Prometheus instant query response parsing

use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Scalar(SamplePair),
    Matrix(Vec<serde_json::Value>),
    String(SamplePair),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    #[allow(dead_code)]
    metric: HashMap<String, String>,
    value: SamplePair,
}

/// `[unix_timestamp, "stringified value"]`
#[derive(Debug, Deserialize)]
struct SamplePair(f64, serde_json::Value);

impl SamplePair {
    fn number(&self) -> Result<f64, String> {
        let raw = self
            .1
            .as_str()
            .ok_or_else(|| format!("sample value is not a string: {}", self.1))?;

        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| format!("sample value is not numeric: {:?}", raw))?;

        if !value.is_finite() {
            return Err(format!("sample value is not finite: {}", raw));
        }

        Ok(value)
    }
}

/// Extract the single numeric value of an instant query response
///
/// Returns `Ok(None)` when the result set is empty and `Err` with a
/// description when the body is malformed, the backend reported an error,
/// or the result does not hold exactly one numeric sample.
pub fn parse_instant_value(body: &str) -> Result<Option<f64>, String> {
    let response: QueryResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid JSON body: {}", e))?;

    if response.status != "success" {
        return Err(format!(
            "backend returned status {} ({}): {}",
            response.status,
            response.error_type.as_deref().unwrap_or("unknown"),
            response.error.as_deref().unwrap_or("no error message")
        ));
    }

    match response.data {
        None => Err("response has no data section".to_string()),
        Some(QueryData::Vector(samples)) => match samples.as_slice() {
            [] => Ok(None),
            [sample] => sample.value.number().map(Some),
            _ => Err(format!(
                "expected exactly one sample, got {}",
                samples.len()
            )),
        },
        Some(QueryData::Scalar(pair)) => pair.number().map(Some),
        Some(QueryData::Matrix(_)) => {
            Err("expected an instant vector, got a range matrix".to_string())
        }
        Some(QueryData::String(_)) => Err("expected a numeric result, got a string".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vector_sample() {
        let body = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {"pod": "web-0"}, "value": [1700000000.123, "0.25"]}]
            }
        }"#;
        assert_eq!(parse_instant_value(body), Ok(Some(0.25)));
    }

    #[test]
    fn test_parse_empty_vector() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[]}}"#;
        assert_eq!(parse_instant_value(body), Ok(None));
    }

    #[test]
    fn test_parse_scalar() {
        let body = r#"{"status":"success","data":{"resultType":"scalar","result":[1700000000,"42"]}}"#;
        assert_eq!(parse_instant_value(body), Ok(Some(42.0)));
    }

    #[test]
    fn test_numeric_value_is_rejected() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000,0.25]}]}}"#;
        let err = parse_instant_value(body).unwrap_err();
        assert!(err.contains("not a string"));
    }

    #[test]
    fn test_garbage_value_is_rejected() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000,"abc"]}]}}"#;
        assert!(parse_instant_value(body).is_err());
    }

    #[test]
    fn test_nan_is_rejected() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[{"metric":{},"value":[1700000000,"NaN"]}]}}"#;
        assert!(parse_instant_value(body).is_err());
    }

    #[test]
    fn test_multiple_samples_are_rejected() {
        let body = r#"{"status":"success","data":{"resultType":"vector","result":[
            {"metric":{"pod":"a"},"value":[1,"1"]},
            {"metric":{"pod":"b"},"value":[1,"2"]}
        ]}}"#;
        let err = parse_instant_value(body).unwrap_err();
        assert!(err.contains("exactly one"));
    }

    #[test]
    fn test_backend_error_is_reported() {
        let body = r#"{"status":"error","errorType":"bad_data","error":"parse error at char 5"}"#;
        let err = parse_instant_value(body).unwrap_err();
        assert!(err.contains("bad_data"));
        assert!(err.contains("parse error at char 5"));
    }

    #[test]
    fn test_matrix_is_rejected() {
        let body = r#"{"status":"success","data":{"resultType":"matrix","result":[]}}"#;
        assert!(parse_instant_value(body).is_err());
    }

    #[test]
    fn test_invalid_json() {
        assert!(parse_instant_value("<html>bad gateway</html>").is_err());
    }
}
