//! HTTP-level tests: the full router over an in-memory SQLite store, with
//! FASTA, FAI and GFF3 fixtures in a temp directory.

use std::{io::Write as _, path::Path, sync::Arc, time::Duration};

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
  response::Response,
};
use flate2::{Compression, write::GzEncoder};
use genoref_core::{
  checksum,
  store::ReferenceStore,
  task::TaskKind,
};
use genoref_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt as _;

use crate::{ApiConfig, AppState, IngestOptions, TaskManager, router};

const LINE_BASES: usize = 60;

fn chr1() -> Vec<u8> { vec![b'A'; 1000] }

fn chr2() -> Vec<u8> { b"ACGT".repeat(25) }

/// Write a wrapped FASTA and its FAI. Returns their paths as strings.
fn write_fasta(dir: &Path, stem: &str, contigs: &[(&str, Vec<u8>)]) -> (String, String) {
  let mut fa = Vec::new();
  let mut fai = String::new();
  for (name, seq) in contigs {
    fa.extend_from_slice(format!(">{name} test sequence\n").as_bytes());
    let offset = fa.len();
    for line in seq.chunks(LINE_BASES) {
      fa.extend_from_slice(line);
      fa.push(b'\n');
    }
    fai.push_str(&format!("{name}\t{}\t{offset}\t{LINE_BASES}\t{}\n", seq.len(), LINE_BASES + 1));
  }
  let fa_path = dir.join(format!("{stem}.fa"));
  let fai_path = dir.join(format!("{stem}.fa.fai"));
  std::fs::write(&fa_path, fa).unwrap();
  std::fs::write(&fai_path, fai).unwrap();
  (fa_path.to_str().unwrap().to_owned(), fai_path.to_str().unwrap().to_owned())
}

/// Write a gzipped GFF3 and an (unused) tabix index next to it.
fn write_gff3(dir: &Path, stem: &str, body: &str) -> (String, String) {
  let gz_path = dir.join(format!("{stem}.gff3.gz"));
  let tbi_path = dir.join(format!("{stem}.gff3.gz.tbi"));
  let mut enc = GzEncoder::new(Vec::new(), Compression::default());
  enc.write_all(body.as_bytes()).unwrap();
  std::fs::write(&gz_path, enc.finish().unwrap()).unwrap();
  std::fs::write(&tbi_path, b"").unwrap();
  (gz_path.to_str().unwrap().to_owned(), tbi_path.to_str().unwrap().to_owned())
}

const GENE_AND_EXON: &str = "\
##gff-version 3
chr1\ttest\tgene\t100\t200\t.\t+\t.\tID=gene1;Name=GENE1;gene_type=protein_coding
chr1\ttest\texon\t100\t150\t.\t+\t.\tID=exon1;Parent=gene1;gene_type=protein_coding
";

struct TestApp {
  state: AppState<SqliteStore>,
  dir:   TempDir,
}

impl TestApp {
  async fn new() -> Self {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let http = reqwest::Client::new();
    let tasks = TaskManager::start(store.clone(), http.clone(), IngestOptions::default(), 1);
    let config = ApiConfig {
      service_url_base_path: "https://ref.example.org".into(),
      file_response_chunk_size: 64,
      subsequence_limit: None,
    };
    let state = AppState { store, tasks, http, config: Arc::new(config) };
    Self { state, dir: tempfile::tempdir().unwrap() }
  }

  async fn send(&self, method: &str, uri: &str, headers: &[(header::HeaderName, &str)], body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (k, v) in headers {
      builder = builder.header(k, *v);
    }
    let body = match body {
      Some(json) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    router(self.state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  async fn get(&self, uri: &str) -> Response { self.send("GET", uri, &[], None).await }

  async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let res = self.send(method, uri, &[], body).await;
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
  }

  fn genome_body(&self, id: &str, contigs: Option<Value>) -> Value {
    let (fasta, fai) = write_fasta(self.dir.path(), id, &[("chr1", chr1()), ("chr2", chr2())]);
    let sums = checksum::compute(id.as_bytes());
    let mut body = json!({
      "id": id,
      "aliases": [{ "alias": format!("{id}-alias"), "naming_authority": "custom" }],
      "md5": sums.md5,
      "ga4gh": sums.ga4gh,
      "fasta": fasta,
      "fai": fai,
      "taxon": { "id": "NCBITaxon:9606", "label": "Homo sapiens" },
    });
    if let Some(contigs) = contigs {
      body["contigs"] = contigs;
    }
    body
  }

  /// Register `id` with contigs derived from its FAI.
  async fn register(&self, id: &str) -> Value {
    let (status, body) = self.json("POST", "/genomes", Some(self.genome_body(id, None))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
  }

  async fn attach_gff3(&self, id: &str, gff3: &str) {
    let (gz, tbi) = write_gff3(self.dir.path(), id, gff3);
    let patch = json!({ "gff3_gz": gz, "gff3_gz_tbi": tbi });
    let (status, body) = self.json("PATCH", &format!("/genomes/{id}"), Some(patch)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
  }

  async fn wait_for_task(&self, id: i64) -> Value {
    for _ in 0..500 {
      let (_, task) = self.json("GET", &format!("/tasks/{id}"), None).await;
      if task["status"] == "success" || task["status"] == "error" {
        return task;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {id} did not finish");
  }

  async fn ingest(&self, id: &str) -> Value {
    let (status, task) =
      self.json("POST", "/tasks", Some(json!({ "genome_id": id, "kind": "ingest_features" }))).await;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    assert_eq!(task["status"], "queued");
    assert_eq!(task["message"], "");
    self.wait_for_task(task["id"].as_i64().unwrap()).await
  }
}

async fn body_text(res: Response) -> String {
  let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
  String::from_utf8(bytes.to_vec()).unwrap()
}

// ─── Genomes ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn register_derives_contigs_from_index() {
  let app = TestApp::new().await;
  let genome = app.register("g1").await;

  let contigs = genome["contigs"].as_array().unwrap();
  assert_eq!(contigs.len(), 2);
  let expected = checksum::compute(&chr1());
  assert_eq!(contigs[0]["name"], "chr1");
  assert_eq!(contigs[0]["length"], 1000);
  assert_eq!(contigs[0]["md5"], expected.md5.as_str());
  assert_eq!(contigs[0]["ga4gh"], expected.ga4gh.as_str());
  assert_eq!(
    contigs[0]["refget_uris"][0],
    format!("https://ref.example.org/sequence/{}", expected.md5).as_str()
  );
}

#[tokio::test]
async fn genome_lookup_by_id_and_alias() {
  let app = TestApp::new().await;
  app.register("g1").await;

  let (status, by_id) = app.json("GET", "/genomes/g1", None).await;
  assert_eq!(status, StatusCode::OK);
  let (_, by_alias) = app.json("GET", "/genomes/g1-alias", None).await;
  assert_eq!(by_id, by_alias);
  let ga4gh = by_id["ga4gh"].as_str().unwrap();
  let (_, by_checksum) = app.json("GET", &format!("/genomes/{ga4gh}"), None).await;
  assert_eq!(by_id, by_checksum);

  let (status, _) = app.json("GET", "/genomes/nope", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);

  let (_, ids) = app.json("GET", "/genomes?response_format=id_list", None).await;
  assert_eq!(ids, json!(["g1"]));
}

#[tokio::test]
async fn register_rejects_bad_input() {
  let app = TestApp::new().await;

  let mut body = app.genome_body("g1", None);
  body["id"] = json!("has spaces");
  let (status, _) = app.json("POST", "/genomes", Some(body)).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  // Contig length disagrees with the FAI.
  let sums = checksum::compute(&chr1());
  let contigs = json!([{ "name": "chr1", "md5": sums.md5, "ga4gh": sums.ga4gh, "length": 999 }]);
  let (status, body) = app.json("POST", "/genomes", Some(app.genome_body("g1", Some(contigs)))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

  app.register("g1").await;
  let (status, _) = app.json("POST", "/genomes", Some(app.genome_body("g1", None))).await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn patch_requires_a_field() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let (status, _) = app.json("PATCH", "/genomes/g1", Some(json!({}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = app.json("PATCH", "/genomes/nope", Some(json!({ "gff3_gz": "x" }))).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn contig_endpoints() {
  let app = TestApp::new().await;
  app.register("g1").await;

  let (_, contigs) = app.json("GET", "/genomes/g1/contigs", None).await;
  assert_eq!(contigs.as_array().unwrap().len(), 2);
  let (status, chr2) = app.json("GET", "/genomes/g1/contigs/chr2", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(chr2["length"], 100);
  let (status, _) = app.json("GET", "/genomes/g1/contigs/chrX", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_genome() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let (status, _) = app.json("DELETE", "/genomes/g1", None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (status, _) = app.json("DELETE", "/genomes/g1", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let md5 = checksum::md5_hex(&chr1());
  assert_eq!(app.get(&format!("/sequence/{md5}")).await.status(), StatusCode::NOT_FOUND);
}

// ─── RefGet ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn sequence_ranges() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let md5 = checksum::md5_hex(&chr1());

  let res = app.get(&format!("/sequence/{md5}?start=0&end=1000")).await;
  assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
  assert_eq!(body_text(res).await, "A".repeat(1000));

  let res = app.get(&format!("/sequence/{md5}?start=0&end=2000")).await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);

  let res = app.get(&format!("/sequence/{md5}?start=5&end=2")).await;
  assert_eq!(res.status(), StatusCode::RANGE_NOT_SATISFIABLE);

  let res = app.get(&format!("/sequence/{md5}")).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert!(
    res.headers()[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/vnd.ga4gh.refget.v2.0.0+plain")
  );
  assert_eq!(body_text(res).await.len(), 1000);
}

#[tokio::test]
async fn sequence_by_every_identifier_form() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let sums = checksum::compute(&chr2());
  let expected = String::from_utf8(chr2()).unwrap();

  for id in [
    sums.md5.clone(),
    format!("md5:{}", sums.md5),
    sums.ga4gh.clone(),
    format!("ga4gh:{}", sums.ga4gh),
  ] {
    let res = app.get(&format!("/sequence/{id}")).await;
    assert_eq!(res.status(), StatusCode::OK, "{id}");
    assert_eq!(body_text(res).await, expected);
  }

  let res = app.get("/sequence/SQ.doesnotexist").await;
  assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sequence_range_header() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let md5 = checksum::md5_hex(&chr2());

  let res = app.send("GET", &format!("/sequence/{md5}"), &[(header::RANGE, "bytes=4-11")], None).await;
  assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
  assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes 4-11/100");
  assert_eq!(body_text(res).await, "ACGTACGT");

  // Spans a line break in the file.
  let res = app.send("GET", &format!("/sequence/{md5}"), &[(header::RANGE, "bytes=58-61")], None).await;
  assert_eq!(body_text(res).await, "GTAC");

  let res = app
    .send("GET", &format!("/sequence/{md5}?start=1"), &[(header::RANGE, "bytes=0-1")], None)
    .await;
  assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sequence_range_bounds() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let uri = format!("/sequence/{}", checksum::md5_hex(&chr2()));

  for range in ["bytes=0-18446744073709551615", "bytes=0-100", "bytes=100-", "bytes=100-100"] {
    let res = app.send("GET", &uri, &[(header::RANGE, range)], None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{range}");
  }

  for query in ["?start=100", "?start=100&end=100"] {
    let res = app.get(&format!("{uri}{query}")).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{query}");
  }

  let res = app.send("GET", &uri, &[(header::RANGE, "bytes=99-")], None).await;
  assert_eq!(res.status(), StatusCode::PARTIAL_CONTENT);
  assert_eq!(res.headers()[header::CONTENT_RANGE], "bytes 99-99/100");
  assert_eq!(body_text(res).await, "T");
}

#[tokio::test]
async fn sequence_content_negotiation() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let md5 = checksum::md5_hex(&chr2());

  let res = app.send("GET", &format!("/sequence/{md5}"), &[(header::ACCEPT, "application/json")], None).await;
  assert_eq!(res.status(), StatusCode::NOT_ACCEPTABLE);
  let res = app.send("GET", &format!("/sequence/{md5}"), &[(header::ACCEPT, "text/plain")], None).await;
  assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn circular_contigs_are_not_served() {
  let app = TestApp::new().await;
  let sums = checksum::compute(&chr1());
  let contigs = json!([{
    "name": "chr1", "md5": sums.md5, "ga4gh": sums.ga4gh, "length": 1000, "circular": true,
  }]);
  let (status, body) = app.json("POST", "/genomes", Some(app.genome_body("g1", Some(contigs)))).await;
  assert_eq!(status, StatusCode::CREATED, "{body}");

  for uri in [
    format!("/sequence/{}", sums.md5),
    format!("/sequence/{}?start=0&end=10", sums.md5),
    format!("/sequence/{}?start=10&end=0", sums.md5),
  ] {
    assert_eq!(app.get(&uri).await.status(), StatusCode::NOT_IMPLEMENTED, "{uri}");
  }
}

#[tokio::test]
async fn sequence_metadata_and_service_info() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let sums = checksum::compute(&chr1());

  let res = app.get(&format!("/sequence/{}/metadata", sums.ga4gh)).await;
  assert_eq!(res.status(), StatusCode::OK);
  assert_eq!(res.headers()[header::CONTENT_TYPE], "application/vnd.ga4gh.refget.v2.0.0+json");
  let body: Value = serde_json::from_str(&body_text(res).await).unwrap();
  assert_eq!(body["metadata"]["md5"], sums.md5.as_str());
  assert_eq!(body["metadata"]["length"], 1000);
  assert_eq!(body["metadata"]["circular"], false);

  let (status, info) = app.json("GET", "/sequence/service-info", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(info["refget"]["circular_supported"], false);
  assert_eq!(info["refget"]["algorithms"], json!(["md5", "ga4gh"]));
}

// ─── Tasks & features ────────────────────────────────────────────────────────

#[tokio::test]
async fn ingest_then_query_features() {
  let app = TestApp::new().await;
  app.register("g1").await;
  app.attach_gff3("g1", GENE_AND_EXON).await;

  let task = app.ingest("g1").await;
  assert_eq!(task["status"], "success", "{task}");
  assert_eq!(task["message"], "ingested 2 features");

  let (status, page) = app.json("GET", "/genomes/g1/features?feature_type=exon", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(page["pagination"]["total"], 1);
  let exon = &page["results"][0];
  assert_eq!(exon["feature_id"], "exon1");
  assert_eq!(exon["gene_id"], "gene1");
  assert_eq!(exon["parents"], json!(["gene1"]));
  assert_eq!(exon["entries"][0]["start_pos"], 100);
  assert_eq!(exon["entries"][0]["end_pos"], 151);

  let (status, gene) = app.json("GET", "/genomes/g1/features/gene1", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(gene["feature_name"], "GENE1");
  assert_eq!(gene["attributes"]["gene_type"], json!(["protein_coding"]));

  let (_, page) = app.json("GET", "/genomes/g1/features?position=chr1:100-2", None).await;
  assert_eq!(page["pagination"]["total"], 1);
  assert_eq!(page["results"][0]["feature_id"], "gene1");

  let (_, page) = app.json("GET", "/genomes/g1/features?q=gen&q_fzy=true", None).await;
  assert_eq!(page["results"][0]["feature_id"], "gene1");

  // Re-ingesting replaces rather than duplicates.
  let task = app.ingest("g1").await;
  assert_eq!(task["status"], "success");
  let (_, page) = app.json("GET", "/genomes/g1/features", None).await;
  assert_eq!(page["pagination"]["total"], 2);

  let (status, _) = app.json("DELETE", "/genomes/g1/features", None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  let (_, page) = app.json("GET", "/genomes/g1/features", None).await;
  assert_eq!(page["pagination"]["total"], 0);
}

#[tokio::test]
async fn ingestion_skips_selenocysteine_records() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let gff3 = format!(
    "{GENE_AND_EXON}chr1\ttest\tstop_codon_redefined_as_selenocysteine\t120\t122\t.\t+\t0\tParent=gene1\n"
  );
  app.attach_gff3("g1", &gff3).await;

  let task = app.ingest("g1").await;
  assert_eq!(task["status"], "success", "{task}");
  assert_eq!(task["message"], "ingested 2 features");

  let (_, page) = app.json("GET", "/genomes/g1/features", None).await;
  assert_eq!(page["pagination"]["total"], 2);
}

#[tokio::test]
async fn failed_ingestion_keeps_previous_features() {
  let app = TestApp::new().await;
  app.register("g1").await;
  app.attach_gff3("g1", GENE_AND_EXON).await;
  assert_eq!(app.ingest("g1").await["status"], "success");

  let bad = format!("{GENE_AND_EXON}chrZ\ttest\tgene\t1\t10\t.\t+\t.\tID=ghost\n");
  app.attach_gff3("g1", &bad).await;
  let task = app.ingest("g1").await;
  assert_eq!(task["status"], "error");
  assert!(task["message"].as_str().unwrap().contains("chrZ"), "{task}");

  let (_, page) = app.json("GET", "/genomes/g1/features", None).await;
  assert_eq!(page["pagination"]["total"], 2);
}

#[tokio::test]
async fn ingestion_needs_annotation_uris() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let task = app.ingest("g1").await;
  assert_eq!(task["status"], "error");
  assert!(task["message"].as_str().unwrap().contains("gff3_gz"), "{task}");
}

#[tokio::test]
async fn task_creation_errors() {
  let app = TestApp::new().await;
  let (status, _) =
    app.json("POST", "/tasks", Some(json!({ "genome_id": "nope", "kind": "ingest_features" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  app.register("g1").await;
  // A queued task that no worker will pick up.
  let pending = app.state.store.create_task("g1", TaskKind::IngestFeatures).await.unwrap();
  let (status, _) =
    app.json("POST", "/tasks", Some(json!({ "genome_id": "g1", "kind": "ingest_features" }))).await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (_, listed) = app.json("GET", "/tasks?genome_id=g1", None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
  assert_eq!(listed[0]["id"], pending.id);

  let (status, _) = app.json("GET", "/tasks/9999", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn closed_queue_does_not_block_the_genome() {
  let mut app = TestApp::new().await;
  app.register("g1").await;
  let working = std::mem::replace(&mut app.state.tasks, TaskManager::closed());

  let body = json!({ "genome_id": "g1", "kind": "ingest_features" });
  let (status, _) = app.json("POST", "/tasks", Some(body.clone())).await;
  assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

  let (_, listed) = app.json("GET", "/tasks?genome_id=g1", None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
  assert_eq!(listed[0]["status"], "error");
  assert_eq!(listed[0]["message"], "task queue is closed");

  app.state.tasks = working;
  let (status, task) = app.json("POST", "/tasks", Some(body)).await;
  assert_eq!(status, StatusCode::CREATED, "{task}");
}

#[tokio::test]
async fn queued_tasks_resume() {
  let app = TestApp::new().await;
  app.register("g1").await;
  app.attach_gff3("g1", GENE_AND_EXON).await;
  // Persisted but never enqueued, as after a restart.
  let task = app.state.store.create_task("g1", TaskKind::IngestFeatures).await.unwrap();

  let resumed = app.state.tasks.resume_queued(app.state.store.as_ref()).await.unwrap();
  assert_eq!(resumed, 1);
  let task = app.wait_for_task(task.id).await;
  assert_eq!(task["status"], "success", "{task}");
}

#[tokio::test]
async fn feature_query_validation() {
  let app = TestApp::new().await;
  app.register("g1").await;
  let (status, _) = app.json("GET", "/genomes/g1/features?limit=0", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = app.json("GET", "/genomes/g1/features?limit=1001", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  let (status, _) = app.json("GET", "/genomes/nope/features", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = app.json("GET", "/genomes/g1/features/nope", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}
