#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

pub const SALES_HEADER: &str =
    "CLIENTE;COD_PROD;DESCRIPCION;DOCUMENTO;FECHA;CANTIDAD;VENDEDOR;MES;YEAR;MONTO";

/// A small `;` separated sales export covering two products, two sellers and two months.
pub fn sample_sales() -> String {
    [
        SALES_HEADER,
        "Acme;P-1;Widget;F-001;05/01/2024;2;Ana;01;2024;20",
        "Globex;P-1;Widget;F-002;20/01/2024;1;Luis;01;2024;10.5",
        "Acme;P-2;Gadget;F-003;21/01/2024;4;Ana;01;2024;80",
        "Acme;P-1;Widget;F-004;01/02/2024;3;Ana;02;2024;30",
        "Initech;P-1;Widget;F-005;fecha mala;1;Luis;;;5",
    ]
    .join("\n")
        + "\n"
}

pub fn sample_targets() -> String {
    [
        "Vendedor,Categoria,Subcategoria,Articulo,Meta_Cantidad,Meta_Monto",
        "Ana,Tools,Small,Widget,10,100",
        "Luis,Tools,Small,Widget,5,0",
        "Ana,Tools,Large,Gizmo,2,40",
    ]
    .join("\n")
        + "\n"
}

/// Scratch directory that cleans up its files on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn join(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Writes `contents` under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }

    /// Reads a UTF-8 export, dropping its byte-order mark.
    pub fn read_export(&self, path: &Path) -> String {
        let bytes = fs::read(path).expect("read export");
        let text = String::from_utf8(bytes).expect("utf-8 export");
        text.trim_start_matches('\u{feff}').to_string()
    }
}
