use eframe::egui::{ComboBox, Ui};

/// Keep a single choice pointing at an existing option, defaulting to the
/// first one.
pub fn ensure_choice(selected: &mut Option<String>, options: &[String]) {
    let valid = selected.as_ref().is_some_and(|s| options.contains(s));
    if !valid {
        *selected = options.first().cloned();
    }
}

/// Labelled drop-down over `options`.
pub fn select_one(
    ui: &mut Ui,
    id: &str,
    label: &str,
    options: &[String],
    selected: &mut Option<String>,
) {
    ensure_choice(selected, options);
    let current = selected.clone().unwrap_or_default();
    ui.horizontal(|ui: &mut Ui| {
        ui.label(label);
        ComboBox::from_id_salt(id)
            .selected_text(&current)
            .show_ui(ui, |ui: &mut Ui| {
                for option in options {
                    if ui.selectable_label(current == *option, option).clicked() {
                        *selected = Some(option.clone());
                    }
                }
            });
    });
}

/// Labelled multi-choice menu. `selected` keeps the order of picking.
pub fn select_many(ui: &mut Ui, label: &str, options: &[String], selected: &mut Vec<String>) {
    selected.retain(|s| options.contains(s));
    let summary = if selected.is_empty() {
        "Choose…".to_string()
    } else {
        selected.join(", ")
    };
    ui.horizontal(|ui: &mut Ui| {
        ui.label(label);
        ui.menu_button(summary, |ui: &mut Ui| {
            for option in options {
                let mut checked = selected.contains(option);
                if ui.checkbox(&mut checked, option).changed() {
                    if checked {
                        selected.push(option.clone());
                    } else {
                        selected.retain(|s| s != option);
                    }
                }
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_defaults_to_first_option() {
        let options = vec!["a".to_string(), "b".to_string()];
        let mut selected = None;
        ensure_choice(&mut selected, &options);
        assert_eq!(selected.as_deref(), Some("a"));

        let mut stale = Some("gone".to_string());
        ensure_choice(&mut stale, &options);
        assert_eq!(stale.as_deref(), Some("a"));

        let mut kept = Some("b".to_string());
        ensure_choice(&mut kept, &options);
        assert_eq!(kept.as_deref(), Some("b"));

        let mut none = Some("a".to_string());
        ensure_choice(&mut none, &[]);
        assert_eq!(none, None);
    }
}
