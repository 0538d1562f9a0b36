//! The in-memory model of a PLY header.
//!
//! A [`Schema`] is built up either by the header parser or through the
//! writer's builder methods, and is append-only: elements, properties,
//! comments and obj_info lines can be added but never changed or removed.
//! While a body is read or written the schema is only observed.

use crate::error::{Error, Result};
use crate::scalar::ScalarType;

/// The type of one property: a single scalar or a length-prefixed list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    Scalar(ScalarType),
    List {
        /// Type of the length prefix stored before the entries.
        len_type: ScalarType,
        /// Type of each entry.
        scalar_type: ScalarType,
    },
}

impl PropertyType {
    pub fn is_list(&self) -> bool {
        matches!(self, PropertyType::List { .. })
    }

    /// The entry type for lists, the value type for scalars.
    pub fn scalar_type(&self) -> ScalarType {
        match *self {
            PropertyType::Scalar(scalar_type) => scalar_type,
            PropertyType::List { scalar_type, .. } => scalar_type,
        }
    }

    pub fn len_type(&self) -> Option<ScalarType> {
        match *self {
            PropertyType::Scalar(_) => None,
            PropertyType::List { len_type, .. } => Some(len_type),
        }
    }
}

/// The header declaration of one property.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: String,
    pub ty: PropertyType,
}

/// The header declaration of one element group.
#[derive(Debug, Clone)]
pub struct ElementDef {
    pub name: String,

    /// Declared number of instances in this group.
    pub count: u64,

    /// Declarations for all properties of this group, in file order.
    pub property_defs: Vec<PropertyDef>,
}

impl ElementDef {
    /// Position of the property called `name`, if any.
    pub fn prop_pos(&self, name: &str) -> Option<usize> {
        self.property_defs.iter().position(|p| p.name == name)
    }
}

/// Everything a header declares: the element groups in order plus the
/// free-form comment and obj_info lines.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    elements: Vec<ElementDef>,
    comments: Vec<String>,
    obj_infos: Vec<String>,
}

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Schema(format!("{} name must not be empty", kind)));
    }
    if name.bytes().any(|b| b.is_ascii_whitespace()) {
        return Err(Error::Schema(format!(
            "{} name \"{}\" must not contain whitespace",
            kind, name,
        )));
    }
    Ok(())
}

fn check_line(kind: &str, text: &str) -> Result<()> {
    if text.contains('\n') || text.contains('\r') {
        return Err(Error::Schema(format!(
            "{} text must not contain line terminators",
            kind,
        )));
    }
    Ok(())
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a new element group with the given declared instance count.
    pub fn add_element(&mut self, name: &str, count: u64) -> Result<()> {
        check_name("element", name)?;
        if self.elem_pos(name).is_some() {
            return Err(Error::Schema(format!(
                "duplicate element definition for \"{}\"",
                name,
            )));
        }
        self.elements.push(ElementDef {
            name: name.to_string(),
            count,
            property_defs: Vec::new(),
        });
        Ok(())
    }

    /// Appends a property to the most recently added element.
    pub fn add_property(&mut self, def: PropertyDef) -> Result<()> {
        check_name("property", &def.name)?;
        let elem = self.elements.last_mut().ok_or(Error::OrphanProperty)?;
        if elem.property_defs.iter().any(|p| p.name == def.name) {
            return Err(Error::Schema(format!(
                "duplicate property \"{}\" in element \"{}\"",
                def.name, elem.name,
            )));
        }
        elem.property_defs.push(def);
        Ok(())
    }

    pub fn add_comment(&mut self, text: &str) -> Result<()> {
        check_line("comment", text)?;
        self.comments.push(text.to_string());
        Ok(())
    }

    pub fn add_obj_info(&mut self, text: &str) -> Result<()> {
        check_line("obj_info", text)?;
        self.obj_infos.push(text.to_string());
        Ok(())
    }

    /// All element groups, in declaration order.
    pub fn elements(&self) -> &[ElementDef] {
        &self.elements
    }

    /// All comment lines, in declaration order.
    pub fn comments(&self) -> &[String] {
        &self.comments
    }

    /// All obj_info lines, in declaration order.
    pub fn obj_infos(&self) -> &[String] {
        &self.obj_infos
    }

    /// Position of the element called `name`, if any.
    pub fn elem_pos(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.name == name)
    }

    /// Checks the rule that every declared element carries at least one
    /// property. Called once the header is complete (parsed or emitted).
    pub(crate) fn check_complete(&self) -> Result<()> {
        for elem in &self.elements {
            if elem.property_defs.is_empty() {
                return Err(Error::Schema(format!(
                    "element \"{}\" has no properties",
                    elem.name,
                )));
            }
        }
        Ok(())
    }
}
