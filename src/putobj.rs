use std::fs::File;
use std::path::Path;
use streamfs::remote::{HashKind, LocalStore};
use streamfs::utils::FS_CHUNK_SIZE;

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 && args.len() != 4 {
        eprintln!("{} store_dir file [md5|sha256]", args[0]);
        std::process::exit(1);
    }

    let kind = match args.get(3).map(|s| s.parse::<HashKind>()) {
        None => Some(HashKind::Md5),
        Some(Ok(k)) => Some(k),
        Some(Err(e)) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let src = Path::new(&args[2]);
    let Some(name) = src.file_name().map(|n| n.to_string_lossy().to_string()) else {
        eprintln!("{} is not a file", args[2]);
        std::process::exit(1);
    };

    let r = LocalStore::new(&args[1], FS_CHUNK_SIZE as usize).and_then(|store| {
        let fp = File::open(src).map_err(|e| streamfs::Error::transient(name.as_str(), e))?;
        store.put_reader(&name, fp, kind)
    });

    match r {
        Err(e) => {
            eprintln!("can't put {}, error {}", args[2], e);
            std::process::exit(1);
        }
        Ok(obj) => match obj.checksum {
            Some(sum) => println!("stored {} size {} checksum {}", obj.path, obj.size, sum),
            None => println!("stored {} size {}", obj.path, obj.size),
        },
    }
}
