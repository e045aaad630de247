use serde_json::Value;

use super::SpaceError;
use crate::result::{DesignPoint, ParamValue};

/// A full-factorial design space: every combination of every parameter's options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridSpace {
    params: Vec<(String, Vec<ParamValue>)>,
}

impl GridSpace {
    pub fn new(params: Vec<(String, Vec<ParamValue>)>) -> Result<Self, SpaceError> {
        if params.is_empty() {
            return Err(SpaceError::Compile("design space has no parameters".into()));
        }
        for (name, options) in &params {
            if options.is_empty() {
                return Err(SpaceError::Compile(format!(
                    "parameter {} has no options",
                    name
                )));
            }
        }
        let mut params = params;
        params.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(GridSpace { params })
    }

    /// Compile a JSON definition mapping parameter names to option arrays.
    pub fn compile(definition: &Value) -> Result<Self, SpaceError> {
        let object = definition
            .as_object()
            .ok_or_else(|| SpaceError::Compile("definition must be an object".into()))?;

        let mut params = Vec::with_capacity(object.len());
        for (name, options) in object {
            let options = options.as_array().ok_or_else(|| {
                SpaceError::Compile(format!("options of {} must be an array", name))
            })?;
            let mut values = Vec::with_capacity(options.len());
            for option in options {
                let value = param_value(name, option)?;
                if !values.contains(&value) {
                    values.push(value);
                }
            }
            params.push((name.clone(), values));
        }
        Self::new(params)
    }

    pub fn params(&self) -> &[(String, Vec<ParamValue>)] {
        &self.params
    }

    /// Number of design points in this space.
    pub fn size(&self) -> usize {
        self.params
            .iter()
            .map(|(_, options)| options.len())
            .product()
    }

    pub fn contains(&self, point: &DesignPoint) -> bool {
        point.len() == self.params.len()
            && self
                .params
                .iter()
                .all(|(name, options)| point.get(name).is_some_and(|v| options.contains(v)))
    }

    /// Every point, in lexicographic order of option indices.
    pub fn points(&self) -> Points<'_> {
        Points {
            space: self,
            cursor: Some(vec![0; self.params.len()]),
        }
    }

    /// Split along the parameter with the most options into at most `max_parts` parts.
    pub fn partition(&self, max_parts: usize) -> Result<Vec<GridSpace>, SpaceError> {
        if max_parts == 0 {
            return Err(SpaceError::NoPartition);
        }

        let Some((axis, (_, options))) = self
            .params
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.1.len().cmp(&b.1.len()).then(ib.cmp(ia)))
        else {
            return Err(SpaceError::NoPartition);
        };

        let parts = max_parts.min(options.len());
        let base = options.len() / parts;
        let extra = options.len() % parts;

        let mut result = Vec::with_capacity(parts);
        let mut start = 0;
        for idx in 0..parts {
            let len = base + usize::from(idx < extra);
            let mut params = self.params.clone();
            params[axis].1 = options[start..start + len].to_vec();
            result.push(GridSpace { params });
            start += len;
        }
        Ok(result)
    }
}

fn param_value(name: &str, option: &Value) -> Result<ParamValue, SpaceError> {
    match option {
        Value::Number(n) => n.as_i64().map(ParamValue::Int).ok_or_else(|| {
            SpaceError::Compile(format!("option {} of {} is not an integer", n, name))
        }),
        Value::String(s) => Ok(ParamValue::Text(s.clone())),
        other => Err(SpaceError::Compile(format!(
            "option {} of {} must be an integer or string",
            other, name
        ))),
    }
}

/// Iterator over the points of a [`GridSpace`].
pub struct Points<'a> {
    space: &'a GridSpace,
    cursor: Option<Vec<usize>>,
}

impl Iterator for Points<'_> {
    type Item = DesignPoint;

    fn next(&mut self) -> Option<DesignPoint> {
        let cursor = self.cursor.as_mut()?;
        let point = self
            .space
            .params
            .iter()
            .zip(cursor.iter())
            .map(|((name, options), &i)| (name.clone(), options[i].clone()))
            .collect();

        let mut advanced = false;
        for (slot, (_, options)) in cursor.iter_mut().zip(&self.space.params).rev() {
            *slot += 1;
            if *slot < options.len() {
                advanced = true;
                break;
            }
            *slot = 0;
        }
        if !advanced {
            self.cursor = None;
        }
        Some(point)
    }
}
