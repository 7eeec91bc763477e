use std::io::{self, Read};

fn main() {
    let mut html = String::new();
    io::stdin().read_to_string(&mut html).expect("read stdin");
    match webmark::convert(&html) {
        Ok(md) => print!("{md}"),
        Err(err) => {
            eprintln!("conversion failed: {err}");
            std::process::exit(1);
        }
    }
}
