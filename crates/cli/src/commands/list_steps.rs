//! Step registry listing

use std::collections::BTreeMap;

use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};

use flowreplay_engine::default_registry;

pub fn execute() -> anyhow::Result<()> {
    let registry = default_registry();
    let mut by_category: BTreeMap<&'static str, Vec<_>> = BTreeMap::new();
    for info in registry.list() {
        by_category.entry(info.category).or_default().push(info);
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["category", "step", "description"]);

    let mut total = 0;
    for (category, mut steps) in by_category {
        steps.sort_by_key(|s| s.name);
        for info in steps {
            table.add_row(vec![category, info.name, info.description]);
            total += 1;
        }
    }

    println!("{table}");
    println!("{} steps registered", total);
    Ok(())
}
