use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ledgerlift_core::rewrite::passes::{ContractCleanup, EntityAnnotator};
use ledgerlift_core::rewrite::run_pass;
use ledgerlift_core::JavaParser;

/// An entity class with `fields` private fields and a getter/setter pair for each
fn entity_source(fields: usize) -> String {
    let mut text = String::from("package entities;\n\nimport java.io.Serializable;\n\npublic class Store implements Serializable {\n");
    for i in 0..fields {
        text.push_str(&format!("\tprivate String Field{i};\n"));
    }
    for i in 0..fields {
        text.push_str(&format!(
            "\n\tpublic String getField{i}() {{\n\t\treturn Field{i};\n\t}}\n\n\tpublic void setField{i}(String field{i}) {{\n\t\tthis.Field{i} = field{i};\n\t}}\n"
        ));
    }
    text.push_str("}\n");
    text
}

fn contract_source(methods: usize) -> String {
    let mut text = String::from("public class ProcessSaleImpl implements ProcessSale {\n");
    for i in 0..methods {
        text.push_str(&format!(
            "\tpublic boolean op{i}() {{\n\t\trefresh();\n\t\tList<Item> items = EntityManager.getAllInstancesOf(\"Item\");\n\t\treturn true;\n\t}}\n"
        ));
    }
    text.push_str("\tpublic void refresh() {\n\t}\n}\n");
    text
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    let mut parser = JavaParser::new().unwrap();

    for fields in [10, 100, 500] {
        let text = entity_source(fields);
        group.bench_with_input(BenchmarkId::new("entity", fields), &text, |b, text| {
            b.iter(|| parser.parse("Store.java", black_box(text.clone())).unwrap())
        });
    }
    group.finish();
}

fn bench_annotate(c: &mut Criterion) {
    let mut group = c.benchmark_group("annotate");
    let mut parser = JavaParser::new().unwrap();

    for fields in [10, 100, 500] {
        let text = entity_source(fields);
        group.bench_with_input(BenchmarkId::new("parse_edit_render", fields), &text, |b, text| {
            b.iter(|| {
                let source = parser.parse("Store.java", text.clone()).unwrap();
                let mut pass = EntityAnnotator::new("guid", vec!["LocalDate".to_string()]);
                black_box(run_pass(&mut pass, &source).unwrap().rewritten)
            })
        });
    }
    group.finish();
}

fn bench_cleanup(c: &mut Criterion) {
    let mut group = c.benchmark_group("contract_cleanup");
    let mut parser = JavaParser::new().unwrap();

    for methods in [10, 200] {
        let text = contract_source(methods);
        group.bench_with_input(BenchmarkId::new("parse_edit_render", methods), &text, |b, text| {
            b.iter(|| {
                let source = parser.parse("ProcessSaleImpl.java", text.clone()).unwrap();
                black_box(run_pass(&mut ContractCleanup, &source).unwrap().output)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_annotate, bench_cleanup);
criterion_main!(benches);
