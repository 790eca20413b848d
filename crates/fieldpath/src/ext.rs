use crate::{Element, Error, Path, Result};
use duplicate::duplicate_item;
use serde_json::Value;

fn matches_select(item: &Value, key: &str, value: &Value) -> bool {
    match item {
        Value::Object(obj) => obj.get(key).map(|found| found == value).unwrap_or(false),
        _ => false,
    }
}

fn select_index(items: &[Value], key: &str, value: &Value) -> Result<usize> {
    let mut found = None;
    for (idx, item) in items.iter().enumerate() {
        if matches_select(item, key, value) {
            if found.is_some() {
                return Err(Error::SelectMatchedMultipleItems);
            }
            found.replace(idx);
        }
    }
    found.ok_or(Error::SelectMatchedNoItems)
}

fn field_name(comp: &Element) -> Option<&str> {
    match comp {
        Element::Field(field) => Some(field),
        Element::StaticField(field) => Some(field),
        _ => None,
    }
}

pub trait FieldpathExt: Sized {
    fn get_comp(&self, comp: &Element) -> Result<&Self>;
    fn get_path(&self, path: &Path) -> Result<&Self>;

    fn get_comp_mut(&mut self, comp: &Element) -> Result<&mut Self>;
    fn get_path_mut(&mut self, path: &Path) -> Result<&mut Self>;

    fn remove_comp(&mut self, comp: &Element) -> Result<Option<Self>>;
    fn remove_path(&mut self, path: &Path) -> Result<Option<Self>>;

    /// Collect every value matching path, expanding wildcards.
    ///
    /// Missing fields and nulls are not errors, they just produce no values,
    /// traversing into value of unexpected type is.
    fn collect_path(&self, path: &Path) -> Result<Vec<&Self>>;

    fn has_path(&self, path: &Path) -> bool;
}

impl FieldpathExt for Value {
    #[duplicate_item(
        this_method method reference(type) ret_type;
        [get_comp] [get] [&type] [&Self];
        [get_comp_mut] [get_mut] [&mut type] [&mut Self]
    )]
    fn this_method(self: reference([Self]), comp: &Element) -> Result<ret_type> {
        if let Some(field) = field_name(comp) {
            return match self {
                Value::Object(obj) => obj.method(field).ok_or(Error::FieldNotFound),
                _ => Err(Error::NotAnObject),
            };
        }
        match (comp, self) {
            (Element::Select(key, value), Value::Array(items)) => {
                let idx = select_index(items, key, value)?;
                items.method(idx).ok_or(Error::OutOfBounds)
            }
            (Element::Index(idx), Value::Array(items)) => items.method(*idx).ok_or(Error::OutOfBounds),
            (Element::Each, _) => Err(Error::UnexpectedWildcard),
            _ => Err(Error::SelectTargetIsNotArray),
        }
    }

    #[duplicate_item(
        this_method method reference(type) ret_type;
        [get_path] [get_comp] [&type] [&Self];
        [get_path_mut] [get_comp_mut] [&mut type] [&mut Self]
    )]
    fn this_method(self: reference([Self]), path: &Path) -> Result<ret_type> {
        let mut found = self;
        for (idx, elem) in path.iter().enumerate() {
            found = found
                .method(elem)
                .map_err(|e| Error::AtPath((&path[0..idx]).into(), Box::new(e)))?;
        }
        Ok(found)
    }

    fn remove_comp(&mut self, comp: &Element) -> Result<Option<Self>> {
        if let Some(field) = field_name(comp) {
            return match self {
                Value::Object(obj) => Ok(obj.remove(field)),
                _ => Err(Error::NotAnObject),
            };
        }
        match (comp, self) {
            (Element::Select(key, value), Value::Array(items)) => {
                let idx = select_index(items, key, value)?;
                Ok(Some(items.remove(idx)))
            }
            (Element::Index(idx), Value::Array(items)) => {
                if *idx < items.len() {
                    Ok(Some(items.remove(*idx)))
                } else {
                    Err(Error::OutOfBounds)
                }
            }
            (Element::Each, _) => Err(Error::UnexpectedWildcard),
            _ => Err(Error::SelectTargetIsNotArray),
        }
    }

    fn remove_path(&mut self, path: &Path) -> Result<Option<Self>> {
        let (el, path) = path.split_last().ok_or(Error::EmptyPath)?;
        let this = self.get_path_mut(path)?;
        this.remove_comp(el)
            .map_err(|e| Error::AtPath(path.into(), Box::new(e)))
    }

    fn collect_path(&self, path: &Path) -> Result<Vec<&Self>> {
        let mut current = vec![self];
        for (idx, elem) in path.iter().enumerate() {
            let mut next = Vec::with_capacity(current.len());
            for value in current {
                let found = match (elem, value) {
                    (_, Value::Null) => continue,
                    (Element::Each, Value::Array(items)) => {
                        next.extend(items.iter());
                        continue;
                    }
                    (Element::Each, _) => Err(Error::SelectTargetIsNotArray),
                    (elem, value) => match value.get_comp(elem) {
                        Err(Error::FieldNotFound)
                        | Err(Error::OutOfBounds)
                        | Err(Error::SelectMatchedNoItems) => continue,
                        other => other,
                    },
                };
                next.push(
                    found.map_err(|e| Error::AtPath((&path[0..idx]).into(), Box::new(e)))?,
                );
            }
            current = next;
        }
        Ok(current.into_iter().filter(|v| !v.is_null()).collect())
    }

    fn has_path(&self, path: &Path) -> bool {
        self.get_path(path).is_ok()
    }
}
