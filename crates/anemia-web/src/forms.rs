//! 登记表单校验
//!
//! 字段级校验全部通过才放行，错误文案面向最终用户。

use anemia_core::{Gender, NewPatient};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// 姓名字段允许的字符：字母（含西语重音与ñ）与空格
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-ZáéíóúÁÉÍÓÚñÑ\s]+$").expect("name pattern is valid")
    })
}

/// 原始登记表单，字段均为未解析的文本
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationForm {
    #[serde(default)]
    pub nombres: String,
    #[serde(default)]
    pub apellidos: String,
    #[serde(default)]
    pub edad: String,
    #[serde(default)]
    pub genero: String,
}

/// 字段名到错误文案的映射
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldErrors(pub BTreeMap<String, String>);

impl FieldErrors {
    fn push(&mut self, field: &str, message: &str) {
        self.0.insert(field.to_string(), message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl RegistrationForm {
    /// 校验全部字段；任一字段失败则返回完整的错误映射
    pub fn validate(&self) -> std::result::Result<NewPatient, FieldErrors> {
        let mut errors = FieldErrors::default();

        let nombres = self.nombres.trim();
        if nombres.is_empty() {
            errors.push("nombres", "El nombre es obligatorio.");
        } else if !name_pattern().is_match(nombres) {
            errors.push("nombres", "El nombre solo puede contener letras y espacios.");
        }

        let apellidos = self.apellidos.trim();
        if apellidos.is_empty() {
            errors.push("apellidos", "El apellido es obligatorio.");
        } else if !name_pattern().is_match(apellidos) {
            errors.push(
                "apellidos",
                "El apellido solo puede contener letras y espacios.",
            );
        }

        let edad = match self.edad.trim().parse::<u8>() {
            Ok(edad) if edad <= 120 => Some(edad),
            _ => {
                errors.push("edad", "La edad debe ser un número entre 0 y 120.");
                None
            }
        };

        let genero = match self.genero.trim() {
            "masculino" => Some(Gender::Masculino),
            "femenino" => Some(Gender::Femenino),
            _ => {
                errors.push("genero", "Selecciona un género.");
                None
            }
        };

        if !errors.is_empty() {
            return Err(errors);
        }
        // 两个None分支都已写入errors，这里必然是Some
        match (edad, genero) {
            (Some(edad), Some(genero)) => Ok(NewPatient {
                nombres: nombres.to_string(),
                apellidos: apellidos.to_string(),
                edad,
                genero,
            }),
            _ => Err(errors),
        }
    }
}
