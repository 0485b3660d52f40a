//! SQL schema for the genoref SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE ... IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS genomes (
    id          TEXT PRIMARY KEY CHECK (length(id) BETWEEN 1 AND 31),
    md5         TEXT NOT NULL UNIQUE,
    ga4gh       TEXT NOT NULL UNIQUE,
    fasta       TEXT NOT NULL UNIQUE,   -- URI
    fai         TEXT NOT NULL UNIQUE,   -- URI
    gff3_gz     TEXT,
    gff3_gz_tbi TEXT,
    taxon_id    TEXT NOT NULL,          -- NCBITaxon CURIE
    taxon_label TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS genome_aliases (
    genome_id        TEXT NOT NULL REFERENCES genomes(id) ON DELETE CASCADE,
    alias            TEXT NOT NULL,
    naming_authority TEXT NOT NULL,
    PRIMARY KEY (genome_id, alias)
);

CREATE TABLE IF NOT EXISTS genome_contigs (
    genome_id   TEXT    NOT NULL REFERENCES genomes(id) ON DELETE CASCADE,
    contig_name TEXT    NOT NULL,
    position    INTEGER NOT NULL,       -- order within the FASTA
    length      INTEGER NOT NULL CHECK (length >= 0),
    circular    INTEGER NOT NULL DEFAULT 0,
    md5         TEXT    NOT NULL,
    ga4gh       TEXT    NOT NULL,
    PRIMARY KEY (genome_id, contig_name),
    UNIQUE (genome_id, md5),
    UNIQUE (genome_id, ga4gh)
);

CREATE TABLE IF NOT EXISTS genome_contig_aliases (
    genome_id        TEXT NOT NULL,
    contig_name      TEXT NOT NULL,
    alias            TEXT NOT NULL,
    naming_authority TEXT NOT NULL,
    PRIMARY KEY (genome_id, contig_name, alias),
    FOREIGN KEY (genome_id, contig_name)
        REFERENCES genome_contigs(genome_id, contig_name) ON DELETE CASCADE
);

-- `id` is assigned by the ingestion pipeline, not by SQLite, so that gene and
-- parent links can be written in the same pass as the rows they point at.
CREATE TABLE IF NOT EXISTS genome_features (
    id           INTEGER PRIMARY KEY,
    genome_id    TEXT NOT NULL REFERENCES genomes(id) ON DELETE CASCADE,
    contig_name  TEXT NOT NULL,
    strand       TEXT NOT NULL CHECK (strand IN ('+', '-', '?', '.')),
    feature_id   TEXT NOT NULL,
    feature_name TEXT NOT NULL,
    feature_type TEXT NOT NULL CHECK (length(feature_type) BETWEEN 1 AND 31),
    source       TEXT NOT NULL,
    gene_nid     INTEGER REFERENCES genome_features(id)
                     ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED,
    UNIQUE (genome_id, feature_id),
    FOREIGN KEY (genome_id, contig_name)
        REFERENCES genome_contigs(genome_id, contig_name) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS genome_feature_entries (
    feature       INTEGER NOT NULL REFERENCES genome_features(id) ON DELETE CASCADE,
    start_pos     INTEGER NOT NULL,     -- 1-based, inclusive
    end_pos       INTEGER NOT NULL,     -- 1-based, exclusive
    position_text TEXT    NOT NULL,     -- contig:start-end
    score         REAL,
    phase         INTEGER CHECK (phase IS NULL OR phase IN (0, 1, 2)),
    CHECK (end_pos >= start_pos)
);

CREATE TABLE IF NOT EXISTS genome_feature_parents (
    feature INTEGER NOT NULL REFERENCES genome_features(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    parent  INTEGER NOT NULL REFERENCES genome_features(id)
                ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    PRIMARY KEY (feature, parent)
);

-- Attribute keys and values are interned across all genomes.
CREATE TABLE IF NOT EXISTS genome_feature_attribute_keys (
    id       INTEGER PRIMARY KEY,
    attr_key TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS genome_feature_attribute_values (
    id       INTEGER PRIMARY KEY,
    attr_val TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS genome_feature_attributes (
    feature  INTEGER NOT NULL REFERENCES genome_features(id) ON DELETE CASCADE,
    attr_key INTEGER NOT NULL REFERENCES genome_feature_attribute_keys(id),
    attr_val INTEGER NOT NULL REFERENCES genome_feature_attribute_values(id),
    PRIMARY KEY (feature, attr_key, attr_val)
);

CREATE TABLE IF NOT EXISTS tasks (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    genome_id TEXT NOT NULL REFERENCES genomes(id) ON DELETE CASCADE,
    kind      TEXT NOT NULL,
    status    TEXT NOT NULL CHECK (status IN ('queued', 'running', 'success', 'error')),
    message   TEXT,
    created   TEXT NOT NULL             -- RFC 3339 UTC
);

-- At most one unfinished task per genome, enforced across processes.
CREATE UNIQUE INDEX IF NOT EXISTS tasks_one_active_per_genome
    ON tasks(genome_id) WHERE status IN ('queued', 'running');

CREATE INDEX IF NOT EXISTS genome_aliases_alias_idx   ON genome_aliases(alias);
CREATE INDEX IF NOT EXISTS contigs_md5_idx            ON genome_contigs(md5);
CREATE INDEX IF NOT EXISTS contigs_ga4gh_idx          ON genome_contigs(ga4gh);
CREATE INDEX IF NOT EXISTS contig_aliases_alias_idx   ON genome_contig_aliases(alias);
CREATE INDEX IF NOT EXISTS features_type_idx          ON genome_features(genome_id, feature_type);
CREATE INDEX IF NOT EXISTS features_contig_idx        ON genome_features(genome_id, contig_name);
CREATE INDEX IF NOT EXISTS features_gene_idx          ON genome_features(gene_nid);
CREATE INDEX IF NOT EXISTS entries_feature_idx        ON genome_feature_entries(feature);
CREATE INDEX IF NOT EXISTS entries_position_idx       ON genome_feature_entries(position_text);
CREATE INDEX IF NOT EXISTS parents_parent_idx         ON genome_feature_parents(parent);
CREATE INDEX IF NOT EXISTS tasks_genome_idx           ON tasks(genome_id);

PRAGMA user_version = 1;
";
