//! Process labels

use matflow_types::{Protocol, RelaxType, Structure};

/// Format the label shown for a composed workflow
///
/// `Si2 [relax: atoms+cell, moderate protocol] → bands, pdos`
#[must_use]
pub fn process_label(
    structure: &Structure,
    relax_type: RelaxType,
    protocol: Protocol,
    plugins: &[&str],
) -> String {
    let mut label = format!(
        "{} [relax: {}, {protocol} protocol]",
        structure.display_label(),
        relax_type.describe()
    );
    if !plugins.is_empty() {
        label.push_str(" → ");
        label.push_str(&plugins.join(", "));
    }
    label
}
