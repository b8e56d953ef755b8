use weft::{ValType, Value};

/// Parses a `value:type` command-line argument, e.g. `42:i32` or `2.5:f64`.
pub fn parse_value(arg: &str) -> Result<Value, String> {
    let Some((value_str, type_str)) = arg.split_once(':') else {
        return Err(format!(
            "Invalid argument format '{}'. Expected format: value:type (e.g. 42:i32)",
            arg
        ));
    };

    match type_str {
        "i32" => value_str
            .parse::<i32>()
            .map(Value::from_i32)
            .map_err(|_| format!("Failed to parse '{}' as i32", value_str)),
        "i64" => value_str
            .parse::<i64>()
            .map(Value::from_i64)
            .map_err(|_| format!("Failed to parse '{}' as i64", value_str)),
        "f32" => value_str
            .parse::<f32>()
            .map(Value::from_f32)
            .map_err(|_| format!("Failed to parse '{}' as f32", value_str)),
        "f64" => value_str
            .parse::<f64>()
            .map(Value::from_f64)
            .map_err(|_| format!("Failed to parse '{}' as f64", value_str)),
        _ => Err(format!(
            "Unknown type '{}'. Supported types: i32, i64, f32, f64",
            type_str
        )),
    }
}

/// Renders a raw value using its declared type.
pub fn format_value(val: Value, ty: ValType) -> String {
    match ty {
        ValType::I32 => format!("{} ({})", val.as_i32(), ty),
        ValType::I64 => format!("{} ({})", val.as_i64(), ty),
        ValType::F32 => format!("{} ({})", val.as_f32(), ty),
        ValType::F64 => format!("{} ({})", val.as_f64(), ty),
        ValType::FuncRef | ValType::ExternRef => {
            if val.is_null() {
                format!("null ({})", ty)
            } else {
                format!("ref@{} ({})", val.ref_addr(), ty)
            }
        }
        // Signatures carrying v128 are rejected before anything runs.
        ValType::V128 => format!("0x{:x} ({})", val.as_u64(), ty),
    }
}
