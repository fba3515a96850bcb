use slotdb::catalog::TableSchema;
use slotdb::common::Operator;
use slotdb::table::{Condition, Row};
use slotdb::Database;

fn main() {
    println!("slotdb - a page-based storage engine in Rust");
    println!("============================================\n");

    let db_path = "demo.db";
    std::fs::remove_file(db_path).ok();

    let db = Database::open(db_path).expect("Failed to open database");
    println!("Opened database: {}", db_path);

    let schema = TableSchema::builder("cities")
        .string("name")
        .integer("population")
        .boolean("capital")
        .build();
    let table = db.create_table(&schema).expect("Failed to create table");
    println!("Created table: {}\n", table);

    let cities = [
        ("London", 8_982_000, true),
        ("Dijon", 156_920, false),
        ("Paris", 2_161_000, true),
        ("Lyon", 513_275, false),
    ];
    for (name, population, capital) in cities {
        let row = Row::new()
            .with("name", name)
            .with("population", population)
            .with("capital", capital);
        let address = db.add_object("cities", &row).expect("Failed to insert");
        println!("Inserted {} at {}", row, address);
    }

    let conditions = [
        Condition::new("name", Operator::Contains, "on"),
        Condition::new("population", Operator::Lt, 1_000_000),
    ];
    println!("\nSearching where {} and {}:", conditions[0], conditions[1]);
    for row in db
        .search_object("cities", &conditions)
        .expect("Failed to search")
    {
        println!("  - {}", row);
    }

    let deleted = db
        .delete_object("cities", &[Condition::new("capital", Operator::Eq, true)])
        .expect("Failed to delete");
    println!("\nDeleted {} capitals", deleted);

    let stats = db.table_stats("cities").expect("Failed to read stats");
    println!(
        "Table stats: {} pages, {} rows, {} free bytes",
        stats.pages, stats.rows, stats.free_bytes
    );
    let merges = db.compact_table("cities").expect("Failed to compact");
    println!("Compaction merged {} free runs", merges);

    db.flush().expect("Failed to flush");
    drop(db);

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
