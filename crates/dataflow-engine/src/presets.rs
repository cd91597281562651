//! Built-in preset modules
//!
//! These ship with every editor and are registered by
//! [`ModuleRegistry::with_presets`](crate::registry::ModuleRegistry::with_presets).

use serde_json::json;

use crate::types::{ModuleCategory, ModuleDefinition, PortDefinition, PortType};

/// Parses `config.sampleData` as JSON and emits it on `output`
pub fn data_input() -> ModuleDefinition {
    ModuleDefinition::new(
        "data_input",
        r#"
function execute(inputs, config, globals) {
  const data = JSON.parse(config.sampleData || '{}');
  return { output: data };
}
"#,
    )
    .with_label("Data Input", "Enter data manually as JSON")
    .with_category(ModuleCategory::Input)
    .with_output(PortDefinition::new("output", PortType::Json).with_name("Data"))
    .with_config(json!({ "dataType": "manual", "sampleData": "" }))
}

/// Computes profit, margin and revenue from unit cost, price and quantity
pub fn profit_calculator() -> ModuleDefinition {
    ModuleDefinition::new(
        "profit_calculator",
        r#"
function execute(inputs, config, globals) {
  const { cost, price, quantity, tax_rate } = inputs;
  const decimals = config.decimals || 2;
  const tax = (price * quantity * (tax_rate || 0)) / 100;
  const revenue = price * quantity;
  const profit = revenue - (cost * quantity + tax);
  const margin = revenue === 0 ? 0 : (profit / revenue) * 100;
  return {
    profit: Number(profit.toFixed(decimals)),
    profit_margin: Number(margin.toFixed(2)),
    revenue: Number(revenue.toFixed(decimals)),
  };
}
"#,
    )
    .with_label("Profit Calculator", "Profit from cost, price and quantity")
    .with_category(ModuleCategory::Calculation)
    .with_input(PortDefinition::new("cost", PortType::Number).with_name("Cost"))
    .with_input(PortDefinition::new("price", PortType::Number).with_name("Price"))
    .with_input(PortDefinition::new("quantity", PortType::Number).with_name("Quantity"))
    .with_input(PortDefinition::new("tax_rate", PortType::Number).with_name("Tax rate"))
    .with_output(PortDefinition::new("profit", PortType::Number).with_name("Profit"))
    .with_output(PortDefinition::new("profit_margin", PortType::Number).with_name("Margin"))
    .with_output(PortDefinition::new("revenue", PortType::Number).with_name("Revenue"))
    .with_config(json!({ "currency": "CNY", "decimals": 2 }))
}

/// Filters an array of records by one field
pub fn data_filter() -> ModuleDefinition {
    ModuleDefinition::new(
        "data_filter",
        r#"
function execute(inputs, config, globals) {
  const { data } = inputs;
  const { filterField, filterOperator, filterValue } = config;
  if (!Array.isArray(data)) {
    return { filtered_data: data };
  }
  if (!filterField || filterValue === '' || filterValue === undefined) {
    return { filtered_data: data };
  }
  const compareValue = isNaN(filterValue) ? filterValue : Number(filterValue);
  const filtered = data.filter(item => {
    const fieldValue = item[filterField];
    switch (filterOperator) {
      case 'equals': return fieldValue == compareValue;
      case 'not_equals': return fieldValue != compareValue;
      case 'greater_than': return Number(fieldValue) > Number(compareValue);
      case 'less_than': return Number(fieldValue) < Number(compareValue);
      case 'contains': return String(fieldValue).includes(String(compareValue));
      default: return true;
    }
  });
  return { filtered_data: filtered };
}
"#,
    )
    .with_label("Data Filter", "Keep records matching a field condition")
    .with_category(ModuleCategory::Processing)
    .with_input(PortDefinition::new("data", PortType::Json).with_name("Data"))
    .with_output(PortDefinition::new("filtered_data", PortType::Json).with_name("Filtered"))
    .with_config(json!({ "filterField": "", "filterOperator": "equals", "filterValue": "" }))
}

/// Displays whatever it receives; its blank routine passes inputs through
pub fn data_output() -> ModuleDefinition {
    ModuleDefinition::new("data_output", "")
        .with_label("Data Output", "Show the incoming value")
        .with_category(ModuleCategory::Output)
        .with_input(PortDefinition::new("input", PortType::Any).with_name("Value"))
        .with_output(PortDefinition::new("input", PortType::Any).with_name("Value"))
}

/// All built-in modules
pub fn builtin_modules() -> Vec<ModuleDefinition> {
    vec![data_input(), profit_calculator(), data_filter(), data_output()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_ids_are_unique() {
        let mut ids: Vec<String> = builtin_modules().into_iter().map(|m| m.id).collect();
        let count = ids.len();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), count);
    }

    #[test]
    fn test_scripted_presets_define_entry_point() {
        for module in builtin_modules() {
            if !module.routine.trim().is_empty() {
                assert!(
                    module.routine.contains("function execute(inputs, config, globals)"),
                    "{} does not define execute",
                    module.id
                );
            }
        }
    }
}
